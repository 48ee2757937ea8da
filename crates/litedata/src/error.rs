//! Error hierarchy for litedata.
//!
//! Follows the "canonical error struct" pattern: callers classify errors with
//! the `is_xxx()` predicates and [`Error::category`] instead of matching on
//! an internal kind enum.
//!
//! Three families of failure exist:
//! - engine errors: a native call returned a code outside its success set
//! - usage errors: closed reader/connection, duplicate reader/transaction,
//!   unknown column, unsupported type or feature
//! - conversion errors: a value cannot be represented as the requested type

use std::fmt;

use thiserror::Error;

use crate::types::FieldType;

/// Root error type for the litedata crate.
///
/// # Example
///
/// ```rust,ignore
/// use litedata::Error;
///
/// fn handle_error(err: Error) {
///     if let Some(code) = err.sqlite_error_code() {
///         eprintln!("engine failure {code}: {err}");
///     } else if err.is_invalid_operation() {
///         eprintln!("usage error: {err}");
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
}

/// Internal error classification.
///
/// This enum is `pub(crate)` to allow adding variants without breaking changes.
/// External code should use the `is_xxx()` predicate methods instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub(crate) enum ErrorKind {
    /// A native call returned a code outside its success set.
    #[error("SQLite Error {code}: '{message}'")]
    Sqlite {
        code: i32,
        extended_code: i32,
        message: String,
    },

    /// Operation invoked in a state that does not allow it.
    #[error("{operation} is not valid: {message}")]
    InvalidOperation {
        operation: &'static str,
        message: String,
    },

    /// An argument value was rejected.
    #[error("invalid argument '{name}': {message}")]
    Argument { name: String, message: String },

    /// An ordinal or parameter index outside the valid range.
    #[error("index out of range: {what}")]
    IndexOutOfRange { what: String },

    /// Column name lookup found no match.
    #[error("no column named '{name}'")]
    ColumnNotFound { name: String },

    /// Feature the provider does not implement.
    #[error("not supported: {feature}")]
    NotSupported { feature: String },

    /// Value cannot be represented as the requested field type.
    #[error("cannot convert value to {field_type}: {message}")]
    Conversion {
        field_type: FieldType,
        message: String,
    },

    /// A NULL value was read through a non-nullable accessor.
    #[error("value is NULL and cannot be read as {field_type}")]
    Null { field_type: FieldType },

    /// Malformed connection string.
    #[error("invalid connection string: {message}")]
    ConnectionString { message: String },
}

/// DB-API style family an error belongs to.
///
/// Engine result codes are grouped the same way a DB-API driver groups
/// server errors, so callers can react to "constraint violated" or
/// "database busy" without memorising numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection parameters or provider usage.
    Interface,
    /// Engine-side operational failure (busy, locked, I/O, cannot open).
    Operational,
    /// Bad SQL or misuse of the API surface.
    Programming,
    /// Constraint violation.
    Integrity,
    /// Value conversion or range problems.
    Data,
    /// Unsupported feature.
    NotSupported,
    /// Unexpected internal engine error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interface => "InterfaceError",
            Self::Operational => "OperationalError",
            Self::Programming => "ProgrammingError",
            Self::Integrity => "IntegrityError",
            Self::Data => "DataError",
            Self::NotSupported => "NotSupportedError",
            Self::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

impl Error {
    // ═══════════════════════════════════════════════════════════════════════
    // Constructors
    // ═══════════════════════════════════════════════════════════════════════

    /// Create an engine error from a result code and the engine's message.
    #[must_use]
    pub fn sqlite(extended_code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Sqlite {
                code: extended_code & 0xff,
                extended_code,
                message: message.into(),
            },
        }
    }

    /// Create an invalid-operation error naming the attempted operation.
    #[must_use]
    pub fn invalid_operation(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidOperation {
                operation,
                message: message.into(),
            },
        }
    }

    /// Create an argument error.
    #[must_use]
    pub fn argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Argument {
                name: name.into(),
                message: message.into(),
            },
        }
    }

    /// Create an index-out-of-range error.
    #[must_use]
    pub fn index_out_of_range(what: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::IndexOutOfRange { what: what.into() },
        }
    }

    /// Create an error for a column name that does not exist.
    #[must_use]
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ColumnNotFound { name: name.into() },
        }
    }

    /// Create an unsupported-feature error.
    #[must_use]
    pub fn not_supported(feature: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotSupported {
                feature: feature.into(),
            },
        }
    }

    /// Create a value conversion error.
    #[must_use]
    pub fn conversion(field_type: FieldType, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Conversion {
                field_type,
                message: message.into(),
            },
        }
    }

    /// Create an error for a NULL read through a non-nullable accessor.
    #[must_use]
    pub const fn null(field_type: FieldType) -> Self {
        Self {
            kind: ErrorKind::Null { field_type },
        }
    }

    /// Create a connection-string error.
    #[must_use]
    pub fn connection_string(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ConnectionString {
                message: message.into(),
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Predicate Methods (is_xxx)
    // ═══════════════════════════════════════════════════════════════════════

    /// Returns true if this error came from the native engine.
    #[must_use]
    pub const fn is_sqlite(&self) -> bool {
        matches!(self.kind, ErrorKind::Sqlite { .. })
    }

    /// Returns true if this is an invalid-operation (usage) error.
    #[must_use]
    pub const fn is_invalid_operation(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidOperation { .. })
    }

    /// Returns true if this is an argument error.
    #[must_use]
    pub const fn is_argument(&self) -> bool {
        matches!(self.kind, ErrorKind::Argument { .. })
    }

    /// Returns true for ordinal, parameter-index and column-name lookup failures.
    #[must_use]
    pub const fn is_index_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::IndexOutOfRange { .. } | ErrorKind::ColumnNotFound { .. }
        )
    }

    /// Returns true if this is an unsupported-feature error.
    #[must_use]
    pub const fn is_not_supported(&self) -> bool {
        matches!(self.kind, ErrorKind::NotSupported { .. })
    }

    /// Returns true if a value could not be converted (including NULL reads).
    #[must_use]
    pub const fn is_conversion(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Conversion { .. } | ErrorKind::Null { .. }
        )
    }

    /// Returns true if a NULL value was read through a non-nullable accessor.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self.kind, ErrorKind::Null { .. })
    }

    /// Returns true if the connection string was rejected.
    #[must_use]
    pub const fn is_connection_string(&self) -> bool {
        matches!(self.kind, ErrorKind::ConnectionString { .. })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Primary engine result code, if this is an engine error.
    #[must_use]
    pub const fn sqlite_error_code(&self) -> Option<i32> {
        match self.kind {
            ErrorKind::Sqlite { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Extended engine result code, if this is an engine error.
    #[must_use]
    pub const fn extended_error_code(&self) -> Option<i32> {
        match self.kind {
            ErrorKind::Sqlite { extended_code, .. } => Some(extended_code),
            _ => None,
        }
    }

    /// Name of the operation an invalid-operation error refers to.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self.kind {
            ErrorKind::InvalidOperation { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// DB-API style family of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match &self.kind {
            ErrorKind::Sqlite { code, .. } => category_for_code(*code),
            ErrorKind::InvalidOperation { .. }
            | ErrorKind::Argument { .. }
            | ErrorKind::IndexOutOfRange { .. }
            | ErrorKind::ColumnNotFound { .. } => ErrorCategory::Programming,
            ErrorKind::NotSupported { .. } => ErrorCategory::NotSupported,
            ErrorKind::Conversion { .. } | ErrorKind::Null { .. } => ErrorCategory::Data,
            ErrorKind::ConnectionString { .. } => ErrorCategory::Interface,
        }
    }
}

/// Map a primary engine result code to its error family.
const fn category_for_code(code: i32) -> ErrorCategory {
    use libsqlite3_sys as ffi;

    match code {
        ffi::SQLITE_CONSTRAINT => ErrorCategory::Integrity,
        ffi::SQLITE_MISMATCH | ffi::SQLITE_RANGE | ffi::SQLITE_TOOBIG => ErrorCategory::Data,
        ffi::SQLITE_ERROR | ffi::SQLITE_AUTH => ErrorCategory::Programming,
        ffi::SQLITE_MISUSE | ffi::SQLITE_INTERNAL => ErrorCategory::Internal,
        // BUSY, LOCKED, IOERR, CANTOPEN, FULL, CORRUPT, READONLY, ...
        _ => ErrorCategory::Operational,
    }
}

/// Result type alias for litedata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use libsqlite3_sys as ffi;

    #[test]
    fn test_sqlite_error_splits_extended_code() {
        let err = Error::sqlite(ffi::SQLITE_CONSTRAINT_UNIQUE, "UNIQUE constraint failed: t.a");
        assert!(err.is_sqlite());
        assert_eq!(err.sqlite_error_code(), Some(ffi::SQLITE_CONSTRAINT));
        assert_eq!(
            err.extended_error_code(),
            Some(ffi::SQLITE_CONSTRAINT_UNIQUE)
        );
        assert_eq!(err.category(), ErrorCategory::Integrity);
    }

    #[test]
    fn test_sqlite_error_display() {
        let err = Error::sqlite(ffi::SQLITE_CANTOPEN, "unable to open database file");
        assert_eq!(
            err.to_string(),
            "SQLite Error 14: 'unable to open database file'"
        );
        assert_eq!(err.category(), ErrorCategory::Operational);
    }

    #[test]
    fn test_invalid_operation_names_operation() {
        let err = Error::invalid_operation("get_value", "the reader is closed");
        assert!(err.is_invalid_operation());
        assert_eq!(err.operation(), Some("get_value"));
        assert!(err.to_string().contains("get_value"));
        assert!(err.sqlite_error_code().is_none());
    }

    #[test]
    fn test_column_not_found_is_index_error() {
        let err = Error::column_not_found("missing");
        assert!(err.is_index_error());
        assert!(err.to_string().contains("missing"));
        assert_eq!(err.category(), ErrorCategory::Programming);
    }

    #[test]
    fn test_conversion_and_null() {
        let err = Error::conversion(FieldType::Int32, "value out of range");
        assert!(err.is_conversion());
        assert!(!err.is_null());
        assert_eq!(err.category(), ErrorCategory::Data);

        let err = Error::null(FieldType::String);
        assert!(err.is_conversion());
        assert!(err.is_null());
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            Error::sqlite(ffi::SQLITE_ERROR, "near \"SELEC\": syntax error").category(),
            ErrorCategory::Programming
        );
        assert_eq!(
            Error::sqlite(ffi::SQLITE_BUSY, "database is locked").category(),
            ErrorCategory::Operational
        );
        assert_eq!(
            Error::sqlite(ffi::SQLITE_MISUSE, "bad parameter or other API misuse").category(),
            ErrorCategory::Internal
        );
        assert_eq!(
            Error::not_supported("chunked reads").category(),
            ErrorCategory::NotSupported
        );
        assert_eq!(
            Error::connection_string("empty data source").category(),
            ErrorCategory::Interface
        );
        assert_eq!(ErrorCategory::Integrity.to_string(), "IntegrityError");
    }

    #[test]
    fn test_error_debug() {
        let err = Error::argument("isolation_level", "unsupported");
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Error"));
    }
}
