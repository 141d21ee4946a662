//! Backup Manager.
//!
//! Runs an external dump tool (by default `mongodump`) as a child process
//! and manages the archives it leaves behind.
//!
//! - Archives are named `<version>_<unixTimestampMillis>.gz`
//! - A backup only counts once the command exited 0 and the archive exists
//! - Retention prunes the oldest archives beyond `max_archives`

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;

use crate::backup::errors::{BackupError, BackupResult};
use crate::backup::{
    archive_file_name, parse_archive_file_name, BackupArchive, BackupConfig, BackupOrchestrator,
};
use crate::migrations::MigrationVersion;

/// Backup manager for creating and pruning database dumps.
#[derive(Debug, Clone)]
pub struct BackupManager {
    config: BackupConfig,
    archive_dir: PathBuf,
}

impl BackupManager {
    /// Create a new BackupManager, creating the archive directory if needed.
    pub fn new(config: BackupConfig) -> BackupResult<Self> {
        if config.command.trim().is_empty() {
            return Err(BackupError::invalid_config("Backup command must not be empty"));
        }

        let archive_dir = config.archive_dir.clone();

        if !archive_dir.exists() {
            fs::create_dir_all(&archive_dir).map_err(|e| {
                BackupError::io_error(
                    e,
                    format!("Failed to create backup directory: {}", archive_dir.display()),
                )
            })?;
        }

        if !archive_dir.is_dir() {
            return Err(BackupError::dir_not_accessible(&archive_dir));
        }

        Ok(Self {
            config,
            archive_dir,
        })
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Command arguments with placeholders filled in.
    fn render_args(&self, archive: &Path, version: MigrationVersion) -> Vec<String> {
        let archive = archive.to_string_lossy();
        let version = version.to_string();
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{database}", &self.config.database)
                    .replace("{archive}", &archive)
                    .replace("{version}", &version)
            })
            .collect()
    }

    /// List archives in the archive directory, newest first.
    ///
    /// Files that do not follow the archive naming scheme are skipped.
    pub fn list_archives(&self) -> BackupResult<Vec<BackupArchive>> {
        let mut archives = Vec::new();

        if !self.archive_dir.exists() {
            return Ok(archives);
        }

        for entry in fs::read_dir(&self.archive_dir)
            .map_err(|e| BackupError::io_error(e, "Failed to read backup directory"))?
        {
            let entry =
                entry.map_err(|e| BackupError::io_error(e, "Failed to read directory entry"))?;

            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((before_version, created_at)) = parse_archive_file_name(name) else {
                continue;
            };

            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            archives.push(BackupArchive {
                id: name.to_string(),
                path: path.clone(),
                before_version,
                created_at,
                size_bytes,
            });
        }

        archives.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(archives)
    }

    /// Delete a specific archive.
    pub fn delete_archive(&self, archive_id: &str) -> BackupResult<()> {
        if parse_archive_file_name(archive_id).is_none() {
            return Err(BackupError::not_found(archive_id));
        }

        let archive_path = self.archive_dir.join(archive_id);
        if !archive_path.is_file() {
            return Err(BackupError::not_found(archive_id));
        }

        fs::remove_file(&archive_path).map_err(|e| {
            BackupError::io_error(e, format!("Failed to delete backup: {}", archive_id))
        })
    }

    /// Keep only the `max_archives` most recent archives.
    ///
    /// # Returns
    /// Number of archives deleted
    pub fn enforce_retention(&self) -> BackupResult<u32> {
        let max_archives = self.config.max_archives as usize;
        if max_archives == 0 {
            return Ok(0);
        }

        let mut archives = self.list_archives()?;
        let mut deleted = 0u32;
        while archives.len() > max_archives {
            if let Some(oldest) = archives.pop() {
                match self.delete_archive(&oldest.id) {
                    Ok(()) => deleted += 1,
                    Err(e) => tracing::warn!(archive = %oldest.id, error = %e, "Failed to delete old backup"),
                }
            }
        }

        Ok(deleted)
    }
}

#[async_trait]
impl BackupOrchestrator for BackupManager {
    async fn create_backup(&self, before_version: MigrationVersion) -> BackupResult<BackupArchive> {
        let created_at = Utc::now();
        let id = archive_file_name(before_version, created_at);
        let archive_path = self.archive_dir.join(&id);
        let args = self.render_args(&archive_path, before_version);

        tracing::info!(
            command = %self.config.command,
            archive = %archive_path.display(),
            version = %before_version,
            "Creating backup"
        );

        let output = Command::new(&self.config.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BackupError::spawn_failed(&self.config.command, e))?;

        if !output.status.success() {
            return Err(BackupError::command_failed(
                &self.config.command,
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        let metadata = match tokio::fs::metadata(&archive_path).await {
            Ok(m) if m.is_file() => m,
            _ => return Err(BackupError::archive_missing(&archive_path)),
        };

        let manager = self.clone();
        match tokio::task::spawn_blocking(move || manager.enforce_retention()).await {
            Ok(Ok(0)) => {}
            Ok(Ok(deleted)) => tracing::debug!(deleted, "Pruned old backups"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Backup retention failed"),
            Err(e) => tracing::warn!(error = %e, "Backup retention task failed"),
        }

        tracing::info!(archive = %id, size_bytes = metadata.len(), "Backup created");

        Ok(BackupArchive {
            id,
            path: archive_path,
            before_version,
            created_at,
            size_bytes: metadata.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupErrorCode;
    use tempfile::TempDir;

    fn create_test_config(archive_dir: &Path) -> BackupConfig {
        BackupConfig {
            enabled: true,
            archive_dir: archive_dir.to_path_buf(),
            max_archives: 2,
            ..BackupConfig::default()
        }
    }

    fn v(s: &str) -> MigrationVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_backup_manager_creates_dir() {
        let temp = TempDir::new().unwrap();
        let archive_dir = temp.path().join("backups");
        assert!(!archive_dir.exists());

        let manager = BackupManager::new(create_test_config(&archive_dir));
        assert!(manager.is_ok());
        assert!(archive_dir.exists());
    }

    #[test]
    fn test_backup_manager_rejects_file_as_dir() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not_a_dir");
        fs::write(&file, "x").unwrap();

        let err = BackupManager::new(create_test_config(&file)).err().unwrap();
        assert_eq!(err.code(), BackupErrorCode::BackupDirNotAccessible);
    }

    #[test]
    fn test_render_args() {
        let temp = TempDir::new().unwrap();
        let manager = BackupManager::new(BackupConfig {
            database: "mongodb://db/app".to_string(),
            ..create_test_config(temp.path())
        })
        .unwrap();

        let args = manager.render_args(Path::new("/b/1.0_5.gz"), v("1.0"));
        assert_eq!(
            args,
            vec!["--uri=mongodb://db/app", "--archive=/b/1.0_5.gz", "--gzip"]
        );
    }

    #[test]
    fn test_list_and_retention() {
        let temp = TempDir::new().unwrap();
        let manager = BackupManager::new(create_test_config(temp.path())).unwrap();
        for name in ["1.0_1000.gz", "1.1_2000.gz", "1.2_3000.gz", "README.md"] {
            fs::write(temp.path().join(name), "dump").unwrap();
        }

        let archives = manager.list_archives().unwrap();
        let ids: Vec<_> = archives.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1.2_3000.gz", "1.1_2000.gz", "1.0_1000.gz"]);

        assert_eq!(manager.enforce_retention().unwrap(), 1);
        assert!(!temp.path().join("1.0_1000.gz").exists());
        assert!(temp.path().join("README.md").exists());
    }

    #[test]
    fn test_delete_nonexistent_archive() {
        let temp = TempDir::new().unwrap();
        let manager = BackupManager::new(create_test_config(temp.path())).unwrap();

        let err = manager.delete_archive("1.0_1.gz").unwrap_err();
        assert_eq!(err.code(), BackupErrorCode::BackupNotFound);
        let err = manager.delete_archive("../escape").unwrap_err();
        assert_eq!(err.code(), BackupErrorCode::BackupNotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_backup_runs_command() {
        let temp = TempDir::new().unwrap();
        let manager = BackupManager::new(BackupConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo dump > '{archive}'".to_string()],
            max_archives: 0,
            ..create_test_config(temp.path())
        })
        .unwrap();

        let archive = manager.create_backup(v("1.1")).await.unwrap();
        assert!(archive.path.exists());
        assert!(archive.id.starts_with("1.1_"));
        assert!(archive.id.ends_with(".gz"));
        assert_eq!(archive.before_version, v("1.1"));
        assert!(archive.size_bytes > 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_backup_prunes_older_archives() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("1.0_1000.gz"), "old").unwrap();
        fs::write(temp.path().join("1.0_2000.gz"), "old").unwrap();
        let manager = BackupManager::new(BackupConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo dump > '{archive}'".to_string()],
            max_archives: 1,
            ..create_test_config(temp.path())
        })
        .unwrap();

        let archive = manager.create_backup(v("1.1")).await.unwrap();

        let ids: Vec<_> = manager
            .list_archives()
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![archive.id]);
        assert!(!temp.path().join("1.0_1000.gz").exists());
        assert!(!temp.path().join("1.0_2000.gz").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_backup_command_failure() {
        let temp = TempDir::new().unwrap();
        let manager = BackupManager::new(BackupConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo refused >&2; exit 3".to_string()],
            ..create_test_config(temp.path())
        })
        .unwrap();

        let err = manager.create_backup(v("1.0")).await.unwrap_err();
        assert_eq!(err.code(), BackupErrorCode::BackupCommandFailed);
        assert!(err.message().contains("refused"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_backup_without_archive() {
        let temp = TempDir::new().unwrap();
        let manager = BackupManager::new(BackupConfig {
            command: "true".to_string(),
            args: vec![],
            ..create_test_config(temp.path())
        })
        .unwrap();

        let err = manager.create_backup(v("1.0")).await.unwrap_err();
        assert_eq!(err.code(), BackupErrorCode::BackupArchiveMissing);
    }

    #[tokio::test]
    async fn test_create_backup_missing_program() {
        let temp = TempDir::new().unwrap();
        let manager = BackupManager::new(BackupConfig {
            command: "definitely-not-a-dump-tool".to_string(),
            ..create_test_config(temp.path())
        })
        .unwrap();

        let err = manager.create_backup(v("1.0")).await.unwrap_err();
        assert_eq!(err.code(), BackupErrorCode::BackupSpawnFailed);
    }
}
