//! Connection state machine.
//!
//! Provides shared native state via `Arc<Mutex<ConnectionInner>>` so commands,
//! readers and transactions can reach the handle they were created from.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::builder::ConnectionStringBuilder;
use super::state::{ConnectionState, StateChange};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::native::{self, HandleArena, RawConnection, RawStatement};
use crate::transaction::{IsolationLevel, Transaction};

/// Shared connection type for commands, readers and transactions.
pub type SharedConnection = Arc<Mutex<ConnectionInner>>;

/// Issue a process-unique token identifying a reader or transaction.
pub(crate) fn next_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Native state behind a [`Connection`].
///
/// Owns the native handle, every compiled statement (addressed by
/// generation-checked ids), and the single reader and transaction slots.
#[derive(Debug, Default)]
pub struct ConnectionInner {
    raw: Option<RawConnection>,
    pub(crate) statements: HandleArena<RawStatement>,
    transaction: Option<u64>,
    reader: Option<u64>,
}

impl ConnectionInner {
    pub(crate) const fn is_open(&self) -> bool {
        self.raw.is_some()
    }

    /// The native handle, or an invalid-operation error naming `operation`.
    pub(crate) fn raw(&self, operation: &'static str) -> Result<&RawConnection> {
        self.raw
            .as_ref()
            .ok_or_else(|| Error::invalid_operation(operation, "the connection is not open"))
    }

    pub(crate) const fn transaction(&self) -> Option<u64> {
        self.transaction
    }

    pub(crate) fn begin_transaction(&mut self, token: u64) {
        self.transaction = Some(token);
    }

    /// Release the transaction slot if `token` still holds it.
    pub(crate) fn end_transaction(&mut self, token: u64) -> bool {
        if self.transaction == Some(token) {
            self.transaction = None;
            true
        } else {
            false
        }
    }

    pub(crate) const fn reader(&self) -> Option<u64> {
        self.reader
    }

    pub(crate) fn acquire_reader(&mut self, token: u64, operation: &'static str) -> Result<()> {
        if self.reader.is_some() {
            return Err(Error::invalid_operation(
                operation,
                "the connection already has an open data reader",
            ));
        }
        self.reader = Some(token);
        Ok(())
    }

    pub(crate) fn release_reader(&mut self, token: u64) {
        if self.reader == Some(token) {
            self.reader = None;
        }
    }

    /// Reset and finalize every statement, roll back, and close the handle.
    ///
    /// Returns `Ok(false)` if the connection was already closed. Every step
    /// is attempted; the first failure is returned.
    fn shutdown(&mut self) -> Result<bool> {
        let Some(raw) = self.raw.take() else {
            return Ok(false);
        };
        let mut first_error: Option<Error> = None;

        let statements = self.statements.drain();
        let count = statements.len();
        for statement in statements {
            // reset repeats an earlier step failure, which its reader already reported
            let _ = statement.reset();
            if let Err(err) = statement.finalize() {
                first_error.get_or_insert(err);
            }
        }

        self.transaction = None;
        self.reader = None;
        if !raw.is_autocommit() {
            if let Err(err) = raw.exec("ROLLBACK") {
                first_error.get_or_insert(err);
            }
        }

        if let Err(err) = raw.close() {
            first_error.get_or_insert(err);
        }

        tracing::debug!(statements = count, "closed connection");
        first_error.map_or(Ok(true), Err)
    }
}

type StateListener = Box<dyn FnMut(StateChange) + Send>;

/// Connection to a database file or in-memory database.
///
/// Constructed closed. At most one [`DataReader`](crate::DataReader) and one
/// [`Transaction`] may be open at a time.
///
/// # Example
///
/// ```rust,ignore
/// use litedata::Connection;
///
/// let mut conn = Connection::new("Data Source=:memory:")?;
/// conn.open()?;
/// let mut cmd = conn.create_command("CREATE TABLE t(a INTEGER)");
/// cmd.execute_non_query()?;
/// conn.close()?;
/// ```
pub struct Connection {
    inner: SharedConnection,
    connection_string: String,
    settings: Option<ConnectionStringBuilder>,
    listeners: Vec<StateListener>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connection_string", &self.connection_string)
            .field("state", &self.state())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConnectionInner::default())),
            connection_string: String::new(),
            settings: None,
            listeners: Vec::new(),
        }
    }
}

impl Connection {
    /// Create a closed connection for a connection string.
    ///
    /// The string is validated immediately.
    pub fn new(connection_string: &str) -> Result<Self> {
        let mut conn = Self::default();
        conn.set_connection_string(connection_string)?;
        Ok(conn)
    }

    /// Create a closed connection from prepared settings.
    pub fn from_builder(settings: ConnectionStringBuilder) -> Result<Self> {
        settings.validate()?;
        let mut conn = Self::default();
        conn.connection_string = settings.to_string();
        conn.settings = Some(settings);
        Ok(conn)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════════════

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Replace the connection string. Only allowed while closed; an empty
    /// string unsets it.
    pub fn set_connection_string(&mut self, connection_string: &str) -> Result<()> {
        if self.state() == ConnectionState::Open {
            return Err(Error::invalid_operation(
                "set_connection_string",
                "the connection string cannot be changed while the connection is open",
            ));
        }
        if connection_string.trim().is_empty() {
            self.connection_string.clear();
            self.settings = None;
            return Ok(());
        }
        let settings: ConnectionStringBuilder = connection_string.parse()?;
        self.connection_string = connection_string.to_owned();
        self.settings = Some(settings);
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        if self.inner.lock().is_open() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Data source from the connection string; empty if unset.
    pub fn data_source(&self) -> &str {
        self.settings
            .as_ref()
            .map_or("", ConnectionStringBuilder::data_source)
    }

    /// Schema name of the primary database.
    pub const fn database(&self) -> &'static str {
        "main"
    }

    /// Version of the linked engine library.
    pub fn server_version(&self) -> String {
        native::libversion()
    }

    /// Rowid of the most recent successful INSERT on this connection.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let inner = self.inner.lock();
        Ok(inner.raw("last_insert_rowid")?.last_insert_rowid())
    }

    /// Register a callback raised on every real state transition.
    pub fn on_state_change(&mut self, listener: impl FnMut(StateChange) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub(crate) const fn shared(&self) -> &SharedConnection {
        &self.inner
    }

    fn notify(&mut self, original: ConnectionState, current: ConnectionState) {
        let change = StateChange::new(original, current);
        for listener in &mut self.listeners {
            listener(change);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Open the native handle. Idempotent.
    ///
    /// Applies the busy timeout and, when set, the foreign key enforcement
    /// from the connection string.
    pub fn open(&mut self) -> Result<()> {
        if self.state() == ConnectionState::Open {
            return Ok(());
        }
        let settings = self.settings.as_ref().ok_or_else(|| {
            Error::invalid_operation("open", "the connection string has not been set")
        })?;

        let raw = RawConnection::open(settings.data_source(), settings.to_open_flags())?;
        raw.busy_timeout(settings.default_timeout())?;
        if let Some(enabled) = settings.foreign_keys() {
            raw.exec(if enabled {
                "PRAGMA foreign_keys = ON"
            } else {
                "PRAGMA foreign_keys = OFF"
            })?;
        }

        self.inner.lock().raw = Some(raw);
        tracing::debug!(data_source = self.data_source(), "connection opened");
        self.notify(ConnectionState::Closed, ConnectionState::Open);
        Ok(())
    }

    /// Close the native handle. Idempotent.
    ///
    /// Resets and finalizes every statement still compiled on this
    /// connection (open readers observe themselves as closed), rolls back
    /// any open transaction, and releases the handle. The handle is released
    /// even when a step fails; the first failure is returned.
    pub fn close(&mut self) -> Result<()> {
        let result = self.inner.lock().shutdown();
        match result {
            Ok(false) => Ok(()),
            Ok(true) => {
                self.notify(ConnectionState::Open, ConnectionState::Closed);
                Ok(())
            }
            Err(err) => {
                self.notify(ConnectionState::Open, ConnectionState::Closed);
                Err(err)
            }
        }
    }

    /// Switching databases is not supported.
    pub fn change_database(&mut self, _database: &str) -> Result<()> {
        Err(Error::not_supported("change_database"))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Factories
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a command bound to this connection.
    pub fn create_command(&self, command_text: impl Into<String>) -> Command {
        let mut command = Command::new(command_text);
        command.set_connection(Some(self));
        command
    }

    /// Begin a transaction with the default (serializable) isolation.
    pub fn begin_transaction(&self) -> Result<Transaction> {
        self.begin_transaction_with(IsolationLevel::Unspecified)
    }

    /// Begin a transaction. Only serializable isolation is supported.
    pub fn begin_transaction_with(&self, isolation_level: IsolationLevel) -> Result<Transaction> {
        Transaction::begin(&self.inner, isolation_level)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to close connection on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_open_close_transitions() {
        let mut conn = Connection::new("Data Source=:memory:").unwrap();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        conn.on_state_change(move |change| sink.lock().push(change));

        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.open().unwrap();
        conn.open().unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        conn.close().unwrap();
        conn.close().unwrap();

        assert_eq!(
            *changes.lock(),
            vec![
                StateChange::new(ConnectionState::Closed, ConnectionState::Open),
                StateChange::new(ConnectionState::Open, ConnectionState::Closed),
            ]
        );
    }

    #[test]
    fn test_open_without_connection_string() {
        let mut conn = Connection::default();
        let err = conn.open().unwrap_err();
        assert!(err.is_invalid_operation());
        assert_eq!(err.operation(), Some("open"));
    }

    #[test]
    fn test_open_unwritable_path_is_cantopen() {
        let mut conn = Connection::new("Data Source=/nonexistent/dir/db.sqlite").unwrap();
        let err = conn.open().unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(libsqlite3_sys::SQLITE_CANTOPEN));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_read_only_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let cs = format!("Data Source={};Mode=ReadOnly", path.display());
        let mut conn = Connection::new(&cs).unwrap();
        let err = conn.open().unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(libsqlite3_sys::SQLITE_CANTOPEN));
    }

    #[test]
    fn test_connection_string_locked_while_open() {
        let mut conn = Connection::new("Data Source=:memory:").unwrap();
        conn.open().unwrap();
        assert!(conn.set_connection_string("Data Source=other.db").is_err());
        conn.close().unwrap();
        conn.set_connection_string("Data Source=other.db").unwrap();
        assert_eq!(conn.data_source(), "other.db");
        assert!(Connection::new("Data Source=x;Bogus=1").unwrap_err().is_connection_string());
    }

    #[test]
    fn test_properties() {
        let mut conn = Connection::new("Data Source=:memory:").unwrap();
        assert_eq!(conn.database(), "main");
        assert!(conn.server_version().starts_with("3."));
        assert!(conn.change_database("other").unwrap_err().is_not_supported());
        assert!(conn.last_insert_rowid().unwrap_err().is_invalid_operation());
        conn.open().unwrap();
        assert_eq!(conn.last_insert_rowid().unwrap(), 0);
    }

    #[test]
    fn test_foreign_keys_applied() {
        let mut conn = Connection::new("Data Source=:memory:;Foreign Keys=True").unwrap();
        conn.open().unwrap();
        let mut cmd = conn.create_command(
            "CREATE TABLE p(id INTEGER PRIMARY KEY); \
             CREATE TABLE c(pid INTEGER REFERENCES p(id));",
        );
        cmd.execute_non_query().unwrap();
        cmd.set_command_text("INSERT INTO c VALUES (42)");
        let err = cmd.execute_non_query().unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(libsqlite3_sys::SQLITE_CONSTRAINT));
    }

    #[test]
    fn test_drop_closes() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut conn = Connection::new("Data Source=:memory:").unwrap();
        conn.open().unwrap();
        conn.on_state_change(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        drop(conn);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
