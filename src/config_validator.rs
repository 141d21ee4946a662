//! Configuration Validation
//!
//! Collects every invalid value before failing, so one run of the tool
//! reports all configuration problems at once.

use std::path::Path;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid configuration for '{}': {} (value: {})",
            self.field, self.message, self.value
        )
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of config validation
pub type ValidationResult<T> = Result<T, Vec<ConfigValidationError>>;

/// Configuration validator
pub struct ConfigValidator {
    errors: Vec<ConfigValidationError>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    fn error(&mut self, field: &str, value: impl std::fmt::Display, message: &str) {
        self.errors.push(ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        });
    }

    /// Validate non-empty string
    pub fn validate_non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.error(field, value, "Value cannot be empty");
        }
        self
    }

    /// Validate a name usable as a file stem: letters, digits, `_`, `-`, `.`
    pub fn validate_identifier(&mut self, field: &str, value: &str) -> &mut Self {
        let valid = !value.is_empty()
            && !value.starts_with('.')
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            self.error(
                field,
                value,
                "Must be non-empty and contain only letters, digits, '_', '-' or '.'",
            );
        }
        self
    }

    /// Validate path is a directory, if it exists
    pub fn validate_is_directory(&mut self, field: &str, path: &Path) -> &mut Self {
        if path.exists() && !path.is_dir() {
            self.error(field, path.display(), "Path is not a directory");
        }
        self
    }

    /// Validate range (inclusive)
    pub fn validate_range(&mut self, field: &str, value: i64, min: i64, max: i64) -> &mut Self {
        if value < min || value > max {
            self.error(field, value, &format!("Value must be between {} and {}", min, max));
        }
        self
    }

    /// Validate that a template list mentions a placeholder
    pub fn validate_contains_placeholder(
        &mut self,
        field: &str,
        values: &[String],
        placeholder: &str,
    ) -> &mut Self {
        if !values.iter().any(|v| v.contains(placeholder)) {
            self.error(
                field,
                format!("{:?}", values),
                &format!("At least one argument must contain {}", placeholder),
            );
        }
        self
    }

    /// Finish validation and return result
    pub fn finish(self) -> ValidationResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.errors
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Format validation errors for display
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identifier_validation() {
        let mut v = ConfigValidator::new();
        v.validate_identifier("collection_name", "schema-version_2");
        assert!(v.finish().is_ok());

        for bad in ["", "../escape", ".hidden", "has space"] {
            let mut v = ConfigValidator::new();
            v.validate_identifier("collection_name", bad);
            assert!(v.has_errors(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_range_validation() {
        let mut v = ConfigValidator::new();
        v.validate_range("max_archives", 10, 0, 1000);
        assert!(v.finish().is_ok());

        let mut v = ConfigValidator::new();
        v.validate_range("max_archives", 2000, 0, 1000);
        let err = v.finish().unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].message.contains("between"));
    }

    #[test]
    fn test_directory_validation() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        std::fs::write(&file, "x").unwrap();

        let mut v = ConfigValidator::new();
        v.validate_is_directory("data_dir", temp.path())
            .validate_is_directory("missing", &temp.path().join("missing"));
        assert!(!v.has_errors());

        v.validate_is_directory("migrations_dir", &file);
        assert_eq!(v.errors().len(), 1);
    }

    #[test]
    fn test_multiple_errors() {
        let mut v = ConfigValidator::new();
        v.validate_non_empty("command", " ")
            .validate_identifier("collection_name", "")
            .validate_contains_placeholder("args", &["--gzip".to_string()], "{archive}");

        let errors = v.finish().unwrap_err();
        assert_eq!(errors.len(), 3);
        let formatted = format_validation_errors(&errors);
        assert_eq!(formatted.lines().count(), 3);
        assert!(formatted.contains("{archive}"));
    }
}
