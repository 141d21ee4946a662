//! Structured logging setup.
//!
//! Logs go to stderr; stdout is reserved for the CLI's JSON responses.

use std::io;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Overrides `LoggingConfig::level` when set, e.g. `STEPMIGRATE_LOG=stepmigrate=debug`
pub const LOG_ENV_VAR: &str = "STEPMIGRATE_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, `info` by default
    pub level: String,
    /// One JSON object per event instead of plain text
    pub json_format: bool,
    /// Print the event's module path
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json_format = json;
        self
    }

    pub fn with_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    EnvFilter::try_from_env(LOG_ENV_VAR).or_else(|_| EnvFilter::try_new(&config.level))
}

/// Install the global subscriber.
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = build_filter(config)?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stderr)
                    .with_target(config.include_target)
                    .json(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stderr)
                    .with_target(config.include_target),
            )
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json_format);
    }

    #[test]
    fn test_builder() {
        let config = LoggingConfig::default().with_level("debug").with_json(true);
        assert_eq!(config.level, "debug");
        assert!(config.json_format);
        assert!(!config.include_target);

        let config = config.with_target(true);
        assert!(config.include_target);
    }

    #[test]
    fn test_filter_parses_directives() {
        let config = LoggingConfig::default().with_level("stepmigrate=debug,warn");
        assert!(build_filter(&config).is_ok());
    }
}
