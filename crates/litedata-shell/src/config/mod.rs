//! Configuration management
//!
//! Supports configuration loading with precedence: env > file > CLI > defaults

mod builder;
mod env;
mod file;

pub use builder::{Config, ConfigBuilder, LoggingConfig};
pub use env::load_from_lookup;

use crate::error::Result;

/// Layer the discovered config file and the environment over `cli`.
pub fn load_config(cli: ConfigBuilder) -> Result<ConfigBuilder> {
    let mut builder = cli;

    // Load from config file if exists
    if let Some(path) = file::find_config_file() {
        tracing::info!("Loading configuration from {}", path.display());
        builder = file::load_from_file(&path, builder)?;
    }

    // Override with environment variables
    env::load_from_env(builder)
}

/// Layer a specific config file and the environment over `cli`.
pub fn load_config_from_path(path: &std::path::Path, cli: ConfigBuilder) -> Result<ConfigBuilder> {
    // Load from specified file
    let builder = file::load_from_file(path, cli)?;

    // Override with environment variables
    env::load_from_env(builder)
}
