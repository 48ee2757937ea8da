//! TOML configuration file loading

use std::path::{Path, PathBuf};

use litedata::ConnectionStringBuilder;
use serde::Deserialize;

use super::builder::ConfigBuilder;
use crate::error::{Result, ShellError};
use crate::output::OutputFormat;

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./litedata.toml",
    "~/.config/litedata/config.toml",
    "/etc/litedata/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ShellError::config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        ShellError::config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    apply_file_config(builder, file_config)
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> Result<ConfigBuilder> {
    // Connection settings
    if let Some(conn) = config.connection {
        if let Some(connection) = conn.into_connection_string()? {
            builder = builder.connection(connection);
        }
    }

    // Output settings
    if let Some(format) = config.output.and_then(|output| output.format) {
        builder = builder.output(format);
    }

    // Logging settings
    if let Some(logging) = config.logging {
        if let Some(level) = logging.level {
            builder = builder.log_level(level);
        }

        if let Some(json) = logging.json {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

/// TOML file configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    connection: Option<ConnectionFileConfig>,
    output: Option<OutputFileConfig>,
    logging: Option<LoggingFileConfig>,
}

/// `[connection]` either carries a full connection string or its parts.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConnectionFileConfig {
    string: Option<String>,
    data_source: Option<String>,
    mode: Option<String>,
    cache: Option<String>,
    default_timeout_secs: Option<u64>,
    foreign_keys: Option<bool>,
}

impl ConnectionFileConfig {
    fn into_connection_string(self) -> Result<Option<ConnectionStringBuilder>> {
        let text = match (self.string, self.data_source) {
            (Some(_), Some(_)) => {
                return Err(ShellError::config(
                    "[connection] sets both 'string' and 'data_source'",
                ));
            }
            (Some(string), None) => string,
            (None, Some(data_source)) => {
                let mut parts = vec![format!("Data Source={data_source}")];
                if let Some(mode) = self.mode {
                    parts.push(format!("Mode={mode}"));
                }
                if let Some(cache) = self.cache {
                    parts.push(format!("Cache={cache}"));
                }
                if let Some(secs) = self.default_timeout_secs {
                    parts.push(format!("Default Timeout={secs}"));
                }
                if let Some(enabled) = self.foreign_keys {
                    parts.push(format!("Foreign Keys={enabled}"));
                }
                parts.join(";")
            }
            (None, None) => return Ok(None),
        };

        text.parse::<ConnectionStringBuilder>()
            .map(Some)
            .map_err(|e| ShellError::config(format!("Invalid [connection] settings: {e}")))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputFileConfig {
    format: Option<OutputFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingFileConfig {
    level: Option<String>,
    json: Option<bool>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use litedata::OpenMode;
    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
[connection]
data_source = "app.db"
mode = "ReadOnly"
default_timeout_secs = 5
foreign_keys = true

[output]
format = "json"

[logging]
level = "debug"
json = true
"#,
        );

        let config = load_from_file(file.path(), ConfigBuilder::new())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.connection.data_source(), "app.db");
        assert_eq!(config.connection.mode(), OpenMode::ReadOnly);
        assert_eq!(config.connection.default_timeout(), Duration::from_secs(5));
        assert_eq!(config.connection.foreign_keys(), Some(true));
        assert_eq!(config.output, OutputFormat::Json);
        assert_eq!(config.logging.log_level, "debug");
        assert!(config.logging.json_logs);
    }

    #[test]
    fn test_connection_string_form() {
        let file = write_config("[connection]\nstring = \"Data Source=:memory:\"\n");
        let config = load_from_file(file.path(), ConfigBuilder::new())
            .unwrap()
            .build()
            .unwrap();
        assert!(config.connection.is_memory());
    }

    #[test]
    fn test_file_overrides_cli_layer() {
        let cli = ConfigBuilder::new()
            .connection(ConnectionStringBuilder::new("cli.db"))
            .output(OutputFormat::Json);
        let file = write_config("[connection]\ndata_source = \"file.db\"\n");
        let config = load_from_file(file.path(), cli).unwrap().build().unwrap();
        assert_eq!(config.connection.data_source(), "file.db");
        // untouched by the file
        assert_eq!(config.output, OutputFormat::Json);
    }

    #[test]
    fn test_rejects_conflicting_connection_keys() {
        let file = write_config("[connection]\nstring = \"Data Source=a.db\"\ndata_source = \"b.db\"\n");
        let err = load_from_file(file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_rejects_bad_mode() {
        let file = write_config("[connection]\ndata_source = \"a.db\"\nmode = \"Sideways\"\n");
        let err = load_from_file(file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("Invalid [connection] settings"));
    }

    #[test]
    fn test_rejects_unknown_keys_and_bad_toml() {
        let unknown = write_config("[output]\nwidth = 80\n");
        assert!(load_from_file(unknown.path(), ConfigBuilder::new()).is_err());

        let broken = write_config("[connection\n");
        let err = load_from_file(broken.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_file(&dir.path().join("absent.toml"), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
