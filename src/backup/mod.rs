//! # Backup Module
//!
//! Pre-migration backups. The runner only knows [`BackupOrchestrator`];
//! [`BackupManager`] is the implementation that shells out to a dump tool.

pub mod errors;
pub mod manager;

pub use errors::{BackupError, BackupErrorCode, BackupResult};
pub use manager::BackupManager;

use crate::migrations::MigrationVersion;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Produces a snapshot of the target database before a migration run.
#[async_trait]
pub trait BackupOrchestrator: Send + Sync {
    /// Take a backup of the database as it is at `before_version`.
    ///
    /// The runner awaits this before any unit executes and aborts the run
    /// if it fails.
    async fn create_backup(&self, before_version: MigrationVersion) -> BackupResult<BackupArchive>;
}

/// Backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Back up before every migration run that changes something
    pub enabled: bool,
    /// Connection string handed to the dump command
    pub database: String,
    /// Where archives are written
    pub archive_dir: PathBuf,
    /// Dump program
    pub command: String,
    /// Arguments; `{database}`, `{archive}` and `{version}` are substituted
    pub args: Vec<String>,
    /// Archives to keep, 0 keeps all
    pub max_archives: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database: "mongodb://localhost:27017".to_string(),
            archive_dir: PathBuf::from("./backups"),
            command: "mongodump".to_string(),
            args: vec![
                "--uri={database}".to_string(),
                "--archive={archive}".to_string(),
                "--gzip".to_string(),
            ],
            max_archives: 0,
        }
    }
}

/// A backup archive on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupArchive {
    /// File name, `<version>_<unixTimestampMillis>.gz`
    pub id: String,
    pub path: PathBuf,
    pub before_version: MigrationVersion,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Archive file name for a backup taken at `before_version`.
pub fn archive_file_name(before_version: MigrationVersion, created_at: DateTime<Utc>) -> String {
    format!("{}_{}.gz", before_version, created_at.timestamp_millis())
}

/// Inverse of [`archive_file_name`].
pub fn parse_archive_file_name(name: &str) -> Option<(MigrationVersion, DateTime<Utc>)> {
    let stem = name.strip_suffix(".gz")?;
    let (version, millis) = stem.split_once('_')?;
    let version = version.parse().ok()?;
    let created_at = Utc.timestamp_millis_opt(millis.parse().ok()?).single()?;
    Some((version, created_at))
}
