//! Cursor-style data access over the SQLite C API.
//!
//! This crate exposes SQLite through the connection / command / reader /
//! transaction object model familiar from managed data-access layers, while
//! respecting the engine's dynamic typing: every value is read according to
//! the storage class it actually has, with the column's declared type used to
//! pick a richer client type when the two agree.
//!
//! # Features
//!
//! - Connection strings (`Data Source=app.db;Mode=ReadOnly`) parsed into a
//!   typed [`ConnectionStringBuilder`]
//! - Multi-statement command text with named and positional parameters
//! - Forward-only [`DataReader`] over every result set of a batch
//! - Table-driven type mapping between storage classes and client types
//! - Sealed [`FromSqliteValue`] trait for typed column access
//!
//! # Example
//!
//! ```rust,ignore
//! use litedata::Connection;
//!
//! let mut conn = Connection::new("Data Source=:memory:")?;
//! conn.open()?;
//! conn.create_command("CREATE TABLE t(a INTEGER, b TEXT); INSERT INTO t VALUES (1,'x')")
//!     .execute_non_query()?;
//!
//! let mut cmd = conn.create_command("SELECT a, b FROM t");
//! let mut reader = cmd.execute_reader()?;
//! while reader.read()? {
//!     println!("{} {}", reader.get_int64(0)?, reader.get_string(1)?);
//! }
//! ```

pub mod command;
pub mod connection;
pub mod error;
pub mod native;
pub mod reader;
pub mod transaction;
pub mod types;

// Re-export main types for convenience
pub use command::{Command, Parameter, Parameters};
pub use connection::{
    CacheMode, Connection, ConnectionState, ConnectionStringBuilder, OpenMode, StateChange,
};
pub use error::{Error, ErrorCategory, Result};
pub use reader::DataReader;
pub use transaction::{IsolationLevel, Transaction};
pub use types::{Affinity, FieldType, FromSqliteValue, SqliteTypeMap, SqliteValue, StorageClass, Value};
