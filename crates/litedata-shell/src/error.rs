use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] litedata::Error),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl ShellError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// The core error, if the failure came from the database layer.
    #[must_use]
    pub const fn as_database(&self) -> Option<&litedata::Error> {
        match self {
            Self::Database(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ShellError::config("missing connection");
        assert!(err.is_config());
        assert_eq!(err.to_string(), "Configuration error: missing connection");
        assert!(err.as_database().is_none());
    }

    #[test]
    fn test_database_error_conversion() {
        let err: ShellError = litedata::Error::not_supported("change_database").into();
        assert!(!err.is_config());
        assert!(err.as_database().is_some_and(litedata::Error::is_not_supported));
    }
}
