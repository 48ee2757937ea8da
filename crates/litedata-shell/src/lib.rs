//! SQL shell for litedata

pub mod config;
mod error;
pub mod observability;
pub mod output;
pub mod session;

pub use config::{Config, ConfigBuilder, LoggingConfig};
pub use error::{Result, ShellError};
pub use output::{CommandOutput, OutputFormat, ResultSet};
pub use session::Session;
