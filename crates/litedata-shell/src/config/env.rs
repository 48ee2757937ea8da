//! Environment variable loading for configuration

use super::builder::ConfigBuilder;
use crate::error::Result;
use crate::output::OutputFormat;

/// Environment variable names
mod vars {
    pub const LITEDATA_CONNECTION: &str = "LITEDATA_CONNECTION";
    pub const LITEDATA_OUTPUT: &str = "LITEDATA_OUTPUT";
    pub const LITEDATA_LOG_LEVEL: &str = "LITEDATA_LOG_LEVEL";
    pub const LITEDATA_JSON_LOGS: &str = "LITEDATA_JSON_LOGS";
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Load configuration from the process environment
pub fn load_from_env(builder: ConfigBuilder) -> Result<ConfigBuilder> {
    load_from_lookup(builder, |name| std::env::var(name).ok())
}

/// Load configuration through `lookup`, which returns a variable's value if set
pub fn load_from_lookup(
    mut builder: ConfigBuilder,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConfigBuilder> {
    // Connection string
    if let Some(connection_string) = lookup(vars::LITEDATA_CONNECTION) {
        builder = builder.connection_string(&connection_string)?;
    }

    // Output format
    if let Some(format) = lookup(vars::LITEDATA_OUTPUT) {
        builder = builder.output(format.parse::<OutputFormat>()?);
    }

    // Logging; RUST_LOG wins over the crate-specific level
    if let Some(level) = lookup(vars::RUST_LOG).or_else(|| lookup(vars::LITEDATA_LOG_LEVEL)) {
        builder = builder.log_level(level);
    }

    if let Some(val) = lookup(vars::LITEDATA_JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
