//! Configuration builder and resolved configuration.

use litedata::ConnectionStringBuilder;

use crate::error::{Result, ShellError};
use crate::output::OutputFormat;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            json_logs: false,
        }
    }
}

/// Resolved shell configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub connection: ConnectionStringBuilder,
    pub output: OutputFormat,
    pub logging: LoggingConfig,
}

/// Configuration builder with fluent API.
///
/// Each layer overwrites what the previous layer set, so layers are applied
/// from lowest to highest priority: CLI, then file, then environment.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    connection: Option<ConnectionStringBuilder>,
    output: Option<OutputFormat>,
    log_level: Option<String>,
    json_logs: Option<bool>,
}

impl ConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connection: None,
            output: None,
            log_level: None,
            json_logs: None,
        }
    }

    #[must_use]
    pub fn connection(mut self, connection: ConnectionStringBuilder) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Parse and set a connection string.
    pub fn connection_string(self, connection_string: &str) -> Result<Self> {
        let parsed = connection_string
            .parse::<ConnectionStringBuilder>()
            .map_err(|e| ShellError::config(format!("invalid connection string: {e}")))?;
        Ok(self.connection(parsed))
    }

    #[must_use]
    pub const fn output(mut self, output: OutputFormat) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = Some(enabled);
        self
    }

    pub const fn connection_ref(&self) -> Option<&ConnectionStringBuilder> {
        self.connection.as_ref()
    }

    pub fn build(self) -> Result<Config> {
        let connection = self.connection.ok_or_else(|| {
            ShellError::config("a connection string is required (--connection or LITEDATA_CONNECTION)")
        })?;

        let defaults = LoggingConfig::default();
        Ok(Config {
            connection,
            output: self.output.unwrap_or_default(),
            logging: LoggingConfig {
                log_level: self
                    .log_level
                    .filter(|level| !level.trim().is_empty())
                    .unwrap_or(defaults.log_level),
                json_logs: self.json_logs.unwrap_or(defaults.json_logs),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_connection() {
        let err = ConfigBuilder::new().build().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_build_applies_defaults() {
        let config = ConfigBuilder::new()
            .connection(ConnectionStringBuilder::memory())
            .build()
            .unwrap();
        assert!(config.connection.is_memory());
        assert_eq!(config.output, OutputFormat::Table);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_later_setter_wins() {
        let config = ConfigBuilder::new()
            .connection_string("Data Source=a.db")
            .unwrap()
            .connection_string("Data Source=b.db;Mode=ReadOnly")
            .unwrap()
            .output(OutputFormat::Json)
            .log_level("debug")
            .json_logs(true)
            .build()
            .unwrap();
        assert_eq!(config.connection.data_source(), "b.db");
        assert_eq!(config.output, OutputFormat::Json);
        assert_eq!(config.logging.log_level, "debug");
        assert!(config.logging.json_logs);
    }

    #[test]
    fn test_invalid_connection_string() {
        let err = ConfigBuilder::new()
            .connection_string("Data Source=a.db;Bogus=1")
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("invalid connection string"));
    }
}
