//! # Migration Errors
//!
//! Every failure of a migration run surfaces here with enough context
//! (last persisted version, failing unit) to resume by hand. Nothing is
//! retried silently.

use super::version::MigrationVersion;
use super::Direction;
use crate::backup::errors::BackupError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Result type for version store operations
pub type StoreResult<T> = Result<T, StoreError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Migration error types
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Requested target is neither registered nor 0. Nothing was mutated.
    #[error("Unknown migration version {version}: no registered migration has this version")]
    UnknownVersion { version: MigrationVersion },

    #[error("Migration version {version} is already registered")]
    DuplicateVersion { version: MigrationVersion },

    /// The pre-migration backup failed; no unit ran.
    #[error("Backup before migrating from version {before} failed: {source}")]
    Backup {
        before: MigrationVersion,
        #[source]
        source: BackupError,
    },

    /// A unit's `up`/`down` failed. Steps already applied stay applied.
    #[error(
        "Migration {version} failed while running '{direction}'; \
         version remains at {last_version}: {source}"
    )]
    UnitExecution {
        version: MigrationVersion,
        direction: Direction,
        last_version: MigrationVersion,
        #[source]
        source: StepError,
    },

    /// The unit ran but its new version could not be recorded. The unit's
    /// side effects are in the database while the store still reports
    /// `last_version`.
    #[error(
        "Migration {version} ran '{direction}' but recording version {attempted} failed; \
         the store still reports {last_version}. Inspect the database before retrying: {source}"
    )]
    Persistence {
        version: MigrationVersion,
        direction: Direction,
        attempted: MigrationVersion,
        last_version: MigrationVersion,
        #[source]
        source: StoreError,
    },

    /// Reading the current version failed before anything ran.
    #[error("Failed to read the current migration version: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid migration version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Invalid migration target '{input}': {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error(
        "Cannot rerun towards {target} while at {current}: rerun only replays 'up' of the current version"
    )]
    BackwardRerun {
        target: MigrationVersion,
        current: MigrationVersion,
    },

    #[error("Invalid migration: {reason}")]
    InvalidMigration { reason: String },

    #[error(
        "Checksum mismatch for migration '{migration}': expected {expected}, got {actual}. \
         Migration file may have been manually modified."
    )]
    ChecksumMismatch {
        migration: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to read migration file {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write migration file {path:?}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse migration {path:?}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Migration directory not found: {path:?}")]
    DirectoryNotFound { path: PathBuf },

    #[error("No version left after {last}: migration directories are limited to d.d names")]
    VersionExhausted { last: MigrationVersion },
}

impl MigrationError {
    /// Stable error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownVersion { .. } => "UNKNOWN_VERSION",
            Self::DuplicateVersion { .. } => "DUPLICATE_VERSION",
            Self::Backup { .. } => "BACKUP_FAILED",
            Self::UnitExecution { .. } => "UNIT_EXECUTION_FAILED",
            Self::Persistence { .. } => "PERSISTENCE_FAILED",
            Self::Store(_) => "STORE_UNAVAILABLE",
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::InvalidTarget { .. } => "INVALID_TARGET",
            Self::BackwardRerun { .. } => "BACKWARD_RERUN",
            Self::InvalidMigration { .. } => "INVALID_MIGRATION",
            Self::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            Self::FileRead { .. } => "FILE_READ",
            Self::FileWrite { .. } => "FILE_WRITE",
            Self::ParseError { .. } => "PARSE_ERROR",
            Self::DirectoryNotFound { .. } => "DIRECTORY_NOT_FOUND",
            Self::VersionExhausted { .. } => "VERSION_EXHAUSTED",
        }
    }

    /// Last version confirmed in the store, for failures that happen mid-run.
    pub fn last_version(&self) -> Option<MigrationVersion> {
        match self {
            Self::UnitExecution { last_version, .. } | Self::Persistence { last_version, .. } => {
                Some(*last_version)
            }
            Self::Backup { before, .. } => Some(*before),
            _ => None,
        }
    }

    /// Version of the unit whose execution or recording failed.
    pub fn failing_version(&self) -> Option<MigrationVersion> {
        match self {
            Self::UnitExecution { version, .. } | Self::Persistence { version, .. } => {
                Some(*version)
            }
            _ => None,
        }
    }
}

/// Failure reported by a migration step (`up` or `down`).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StepError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a lower-level error with a description of what was attempted.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Version store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read version record {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write version record {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Version record {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Version store unavailable: {0}")]
    Unavailable(String),
}
