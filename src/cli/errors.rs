//! CLI error types.
//!
//! Every failure leaves the process as `{"error": {"code", "message"}}` on
//! stdout and a non-zero exit status.

use std::fmt;

use crate::backup::BackupError;
use crate::config::ConfigError;
use crate::migrations::MigrationError;

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: String,
    message: String,
    exit_code: i32,
}

impl CliError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            exit_code: 1,
        }
    }

    fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Configuration could not be loaded or is invalid
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new("CONFIG_ERROR", message).with_exit_code(2)
    }

    /// Startup failed before any migration work
    pub fn boot_failed(message: impl Into<String>) -> Self {
        Self::new("BOOT_FAILED", message)
    }

    pub fn io_error(context: &str, err: std::io::Error) -> Self {
        Self::new("IO_ERROR", format!("{}: {}", context, err))
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::config_error(err.to_string())
    }
}

impl From<BackupError> for CliError {
    fn from(err: BackupError) -> Self {
        Self::new(err.code().as_str(), err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::new("SERIALIZATION_ERROR", err.to_string())
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::MigrationVersion;

    #[test]
    fn test_migration_error_keeps_code() {
        let err: CliError = MigrationError::UnknownVersion {
            version: MigrationVersion::from_tenths(20),
        }
        .into();
        assert_eq!(err.code(), "UNKNOWN_VERSION");
        assert!(err.message().contains("2.0"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err = CliError::config_error("bad");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "CONFIG_ERROR: bad");
    }

    #[test]
    fn test_backup_error_code() {
        let err: CliError = BackupError::not_found("1.0_1.gz").into();
        assert_eq!(err.code(), "BACKUP_NOT_FOUND");
    }
}
