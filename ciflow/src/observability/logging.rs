//! Logging setup.

use crate::errors::CiflowError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

fn default_level() -> String {
    "info".to_string()
}

/// Settings for the global `tracing` subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
    /// Include the event target.
    #[serde(default)]
    pub with_target: bool,
    /// Include source file and line.
    #[serde(default)]
    pub with_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            with_target: false,
            with_file: false,
        }
    }
}

impl LoggingConfig {
    /// Sets the default filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Switches to JSON output.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Builds the filter, preferring `RUST_LOG` when present.
    ///
    /// # Errors
    ///
    /// Returns an error if `level` is not a valid filter directive.
    pub fn env_filter(&self) -> Result<EnvFilter, CiflowError> {
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        EnvFilter::try_new(&self.level).map_err(|e| CiflowError::Logging(e.to_string()))
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), CiflowError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_file(config.with_file)
        .with_line_number(config.with_file);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| CiflowError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LoggingConfig = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert!(config.json);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_invalid_level_is_an_error() {
        let config = LoggingConfig::default().with_level("ciflow=loud");
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            assert!(matches!(config.env_filter(), Err(CiflowError::Logging(_))));
        }
    }

    #[test]
    fn test_second_init_does_not_panic() {
        let config = LoggingConfig::default().with_level("warn");
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
