//! Backup error types.
//!
//! Backup errors carry a stable `BACKUP_*` code, a severity and optional
//! path/source context.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Backup error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupErrorCode {
    /// Backups are enabled but no orchestrator was attached
    BackupNotConfigured,
    /// The dump command could not be started
    BackupSpawnFailed,
    /// The dump command exited unsuccessfully
    BackupCommandFailed,
    /// The dump command succeeded but left no archive behind
    BackupArchiveMissing,
    /// Archive not found
    BackupNotFound,
    /// I/O error during backup
    BackupIoError,
    /// Invalid backup configuration
    BackupInvalidConfig,
    /// Archive directory not accessible
    BackupDirNotAccessible,
}

impl BackupErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupErrorCode::BackupNotConfigured => "BACKUP_NOT_CONFIGURED",
            BackupErrorCode::BackupSpawnFailed => "BACKUP_SPAWN_FAILED",
            BackupErrorCode::BackupCommandFailed => "BACKUP_COMMAND_FAILED",
            BackupErrorCode::BackupArchiveMissing => "BACKUP_ARCHIVE_MISSING",
            BackupErrorCode::BackupNotFound => "BACKUP_NOT_FOUND",
            BackupErrorCode::BackupIoError => "BACKUP_IO_ERROR",
            BackupErrorCode::BackupInvalidConfig => "BACKUP_INVALID_CONFIG",
            BackupErrorCode::BackupDirNotAccessible => "BACKUP_DIR_NOT_ACCESSIBLE",
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        match self {
            BackupErrorCode::BackupNotFound => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for BackupErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity level for backup errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Backup error with context
#[derive(Debug)]
pub struct BackupError {
    code: BackupErrorCode,
    message: String,
    path: Option<PathBuf>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackupError {
    /// Create a new backup error
    pub fn new(code: BackupErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Attach path context
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach the underlying error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn not_configured() -> Self {
        Self::new(
            BackupErrorCode::BackupNotConfigured,
            "Backups are enabled but no backup orchestrator is configured",
        )
    }

    pub fn spawn_failed(program: &str, err: io::Error) -> Self {
        Self::new(
            BackupErrorCode::BackupSpawnFailed,
            format!("Failed to start backup command '{}'", program),
        )
        .with_source(err)
    }

    /// `status` is the exit code, `None` when killed by a signal.
    pub fn command_failed(program: &str, status: Option<i32>, stderr: &str) -> Self {
        let status = status
            .map(|code| format!("exit code {}", code))
            .unwrap_or_else(|| "terminated by signal".to_string());
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("Backup command '{}' failed with {}", program, status)
        } else {
            format!("Backup command '{}' failed with {}: {}", program, status, stderr)
        };
        Self::new(BackupErrorCode::BackupCommandFailed, message)
    }

    pub fn archive_missing(path: impl Into<PathBuf>) -> Self {
        Self::new(
            BackupErrorCode::BackupArchiveMissing,
            "Backup command succeeded but produced no archive",
        )
        .with_path(path)
    }

    /// Archive not found
    pub fn not_found(archive_id: impl Into<String>) -> Self {
        Self::new(
            BackupErrorCode::BackupNotFound,
            format!("Backup archive not found: {}", archive_id.into()),
        )
    }

    /// I/O error
    pub fn io_error(err: io::Error, context: impl Into<String>) -> Self {
        Self::new(BackupErrorCode::BackupIoError, context).with_source(err)
    }

    /// Invalid configuration
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(BackupErrorCode::BackupInvalidConfig, message)
    }

    /// Directory not accessible
    pub fn dir_not_accessible(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(
            BackupErrorCode::BackupDirNotAccessible,
            format!("Backup directory not accessible: {}", path.display()),
        )
        .with_path(path)
    }

    /// Get the error code
    pub fn code(&self) -> BackupErrorCode {
        self.code
    }

    /// Get the message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the path if present
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code, self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(
            BackupErrorCode::BackupCommandFailed.as_str(),
            "BACKUP_COMMAND_FAILED"
        );
        assert_eq!(BackupErrorCode::BackupNotFound.as_str(), "BACKUP_NOT_FOUND");
    }

    #[test]
    fn test_command_failed_message() {
        let err = BackupError::command_failed("mongodump", Some(2), "  auth failed\n");
        let display = err.to_string();
        assert!(display.contains("BACKUP_COMMAND_FAILED"));
        assert!(display.contains("exit code 2"));
        assert!(display.ends_with("auth failed"));

        let err = BackupError::command_failed("mongodump", None, "");
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn test_archive_missing_has_path() {
        let err = BackupError::archive_missing("/tmp/backups/1.0_1.gz");
        assert!(err.path().is_some());
        assert_eq!(err.code(), BackupErrorCode::BackupArchiveMissing);
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(BackupErrorCode::BackupNotFound.severity(), Severity::Warning);
        assert_eq!(BackupErrorCode::BackupSpawnFailed.severity(), Severity::Error);
    }

    #[test]
    fn test_io_error_keeps_context_and_source() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let backup_err = BackupError::io_error(io_err, "Failed to read archive directory");
        assert_eq!(backup_err.code(), BackupErrorCode::BackupIoError);
        assert_eq!(backup_err.message(), "Failed to read archive directory");
        assert!(std::error::Error::source(&backup_err).is_some());
    }
}
