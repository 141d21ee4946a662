//! Configuration file loading.
//!
//! `stepmigrate.toml` (every key optional):
//!
//! ```toml
//! data_dir = "./data"
//! migrations_dir = "./migrations"
//! collection_name = "migrations"
//! log_if_latest = true
//! verify_checksums = true
//!
//! [backup]
//! enabled = false
//! database = "mongodb://localhost:27017/app"
//! archive_dir = "./backups"
//! command = "mongodump"
//! args = ["--uri={database}", "--archive={archive}", "--gzip"]
//! max_archives = 10
//! ```

use crate::backup::BackupConfig;
use crate::config_validator::{format_validation_errors, ConfigValidationError, ConfigValidator};
use crate::migrations::RunnerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "stepmigrate.toml";

/// Upper bound for `backup.max_archives`
const MAX_ARCHIVES_LIMIT: i64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Invalid(Vec<ConfigValidationError>),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Holds the version record and the catalog
    pub data_dir: PathBuf,

    /// Scanned for `d.d` migration entries
    pub migrations_dir: PathBuf,

    /// Name of the version store collection
    pub collection_name: String,

    pub log_if_latest: bool,

    /// Reject scripts whose declared checksum no longer matches
    pub verify_checksums: bool,

    pub backup: BackupConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let runner = RunnerConfig::default();
        Self {
            data_dir: PathBuf::from("./data"),
            migrations_dir: PathBuf::from("./migrations"),
            collection_name: runner.collection_name,
            log_if_latest: runner.log_if_latest,
            verify_checksums: true,
            backup: BackupConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path` if given, else `stepmigrate.toml` if present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::load(default_path)
                } else {
                    tracing::debug!("No config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config = Self::parse(content).map_err(|message| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, reporting all problems together.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut v = ConfigValidator::new();
        v.validate_identifier("collection_name", &self.collection_name)
            .validate_is_directory("data_dir", &self.data_dir)
            .validate_is_directory("migrations_dir", &self.migrations_dir);

        if self.backup.enabled {
            v.validate_non_empty("backup.command", &self.backup.command)
                .validate_non_empty("backup.database", &self.backup.database)
                .validate_is_directory("backup.archive_dir", &self.backup.archive_dir)
                .validate_contains_placeholder("backup.args", &self.backup.args, "{archive}");
        }
        v.validate_range(
            "backup.max_archives",
            i64::from(self.backup.max_archives),
            0,
            MAX_ARCHIVES_LIMIT,
        );

        v.finish().map_err(ConfigError::Invalid)
    }

    /// Runner options derived from this file.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            collection_name: self.collection_name.clone(),
            backup: self.backup.enabled,
            log_if_latest: self.log_if_latest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.collection_name, "migrations");
        assert!(config.log_if_latest);
        assert!(config.verify_checksums);
        assert!(!config.backup.enabled);
        assert_eq!(config.runner_config(), RunnerConfig::default());
    }

    #[test]
    fn test_full_file() {
        let config = AppConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/app"
            collection_name = "schema_version"
            log_if_latest = false

            [backup]
            enabled = true
            database = "mongodb://db:27017/app"
            archive_dir = "/var/backups/app"
            max_archives = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/app"));
        assert_eq!(config.backup.max_archives, 5);
        assert_eq!(config.backup.command, "mongodump");

        let runner = config.runner_config();
        assert_eq!(runner.collection_name, "schema_version");
        assert!(runner.backup);
        assert!(!runner.log_if_latest);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = AppConfig::from_toml_str("colection_name = \"typo\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let err = AppConfig::from_toml_str(
            r#"
            collection_name = "../x"

            [backup]
            enabled = true
            command = ""
            args = ["--gzip"]
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Invalid(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "collection_name = \"versions\"\n").unwrap();

        let config = AppConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.collection_name, "versions");

        let err = AppConfig::load(&temp.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
