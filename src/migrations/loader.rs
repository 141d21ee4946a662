//! # Migration Loading
//!
//! Turns a source of migrations (a directory on disk, an embedded list, a
//! test fixture) into migration units. Ordering and uniqueness are left to
//! the registry.

use super::checksum::verify_script;
use super::errors::{MigrationError, MigrationResult};
use super::operations::{OperationExecutor, OperationScript};
use super::version::MigrationVersion;
use super::Migration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the script inside a version directory
pub const SCRIPT_FILE: &str = "migration.yaml";

const SCRIPT_FILE_ALT: &str = "migration.yml";

/// Anything that can produce migration units.
pub trait MigrationSource<D: ?Sized + Sync> {
    fn load(&self) -> MigrationResult<Vec<Migration<D>>>;
}

impl<D: ?Sized + Sync> MigrationSource<D> for Vec<Migration<D>> {
    fn load(&self) -> MigrationResult<Vec<Migration<D>>> {
        Ok(self.clone())
    }
}

/// Pick the version entries out of a directory listing.
///
/// Names that are not exactly one digit, a dot and one digit are skipped.
pub fn discover_versions<I, S>(listing: I) -> Vec<(MigrationVersion, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    listing
        .into_iter()
        .filter_map(|entry| {
            let name = entry.as_ref();
            if !MigrationVersion::is_unit_name(name) {
                tracing::trace!(entry = name, "Ignoring non-version entry");
                return None;
            }
            name.parse().ok().map(|version| (version, name.to_string()))
        })
        .collect()
}

/// On-disk shape of a scripted migration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationScript {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    pub up: OperationScript,

    #[serde(default)]
    pub down: OperationScript,
}

/// Loads scripted migrations from a migrations directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    verify_checksums: bool,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            verify_checksums: true,
        }
    }

    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of the immediate entries of the migrations directory
    pub fn listing(&self) -> MigrationResult<Vec<String>> {
        if !self.dir.is_dir() {
            return Err(MigrationError::DirectoryNotFound {
                path: self.dir.clone(),
            });
        }

        let read_err = |e| MigrationError::FileRead {
            path: self.dir.clone(),
            source: e,
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Find the script for a version entry: a directory holding
    /// `migration.yaml`, or a plain file holding the YAML itself.
    fn script_path(&self, entry: &str) -> MigrationResult<PathBuf> {
        let path = self.dir.join(entry);
        if path.is_file() {
            return Ok(path);
        }

        [SCRIPT_FILE, SCRIPT_FILE_ALT]
            .iter()
            .map(|file| path.join(file))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| MigrationError::InvalidMigration {
                reason: format!("{} has no {} to load", path.display(), SCRIPT_FILE),
            })
    }

    /// Parse one script file into a migration unit.
    pub fn load_script<D>(
        &self,
        version: MigrationVersion,
        path: &Path,
    ) -> MigrationResult<Migration<D>>
    where
        D: OperationExecutor + ?Sized,
    {
        let content = fs::read_to_string(path).map_err(|e| MigrationError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let script: MigrationScript =
            serde_yaml::from_str(&content).map_err(|e| MigrationError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let name = if script.name.trim().is_empty() {
            format!("migration {}", version)
        } else {
            script.name.clone()
        };

        if let Some(declared) = script.checksum.as_deref().filter(|_| self.verify_checksums) {
            verify_script(&content, declared).map_err(|actual| MigrationError::ChecksumMismatch {
                migration: format!("{} ({})", version, name),
                expected: declared.to_string(),
                actual,
            })?;
        }

        if script.up.is_empty() {
            tracing::warn!(version = %version, path = %path.display(), "Migration has no 'up' operations");
        }

        let mut migration = Migration::new(version, name, script.up, script.down).with_source(path);
        migration.checksum = script.checksum;
        Ok(migration)
    }
}

impl<D> MigrationSource<D> for DirectorySource
where
    D: OperationExecutor + ?Sized,
{
    fn load(&self) -> MigrationResult<Vec<Migration<D>>> {
        let listing = self.listing()?;
        let mut migrations = Vec::new();

        for (version, entry) in discover_versions(&listing) {
            let path = self.script_path(&entry)?;
            migrations.push(self.load_script(version, &path)?);
        }

        tracing::debug!(
            dir = %self.dir.display(),
            entries = listing.len(),
            migrations = migrations.len(),
            "Loaded migrations directory"
        );
        Ok(migrations)
    }
}
