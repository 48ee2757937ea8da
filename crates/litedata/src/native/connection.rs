//! Owned `sqlite3*` connection handle.

use std::ffi::{CString, c_char, c_int};
use std::ops::BitOr;
use std::ptr::{self, NonNull};
use std::time::Duration;

use libsqlite3_sys as ffi;

use super::statement::RawStatement;
use super::{cstr_to_string, error_from_handle};
use crate::error::{Error, Result};

// Present in the bundled library but blocklisted from the generated bindings.
unsafe extern "C" {
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}

/// Flags passed to `sqlite3_open_v2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenFlags(c_int);

impl OpenFlags {
    /// Open read-only.
    pub const READ_ONLY: Self = Self(ffi::SQLITE_OPEN_READONLY);
    /// Open for reading and writing.
    pub const READ_WRITE: Self = Self(ffi::SQLITE_OPEN_READWRITE);
    /// Create the database file if it does not exist.
    pub const CREATE: Self = Self(ffi::SQLITE_OPEN_CREATE);
    /// Interpret the filename as a URI.
    pub const URI: Self = Self(ffi::SQLITE_OPEN_URI);
    /// Open a pure in-memory database.
    pub const MEMORY: Self = Self(ffi::SQLITE_OPEN_MEMORY);
    /// Enable shared cache.
    pub const SHARED_CACHE: Self = Self(ffi::SQLITE_OPEN_SHAREDCACHE);
    /// Disable shared cache.
    pub const PRIVATE_CACHE: Self = Self(ffi::SQLITE_OPEN_PRIVATECACHE);

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> c_int {
        self.0
    }

    /// True if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::READ_WRITE | Self::CREATE
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Outcome of compiling the next statement from a command text.
#[derive(Debug)]
pub struct Prepared {
    /// Compiled statement, or `None` if only whitespace/comments remained.
    pub statement: Option<RawStatement>,
    /// Number of bytes of the text (from the requested offset) that were consumed.
    pub consumed: usize,
}

/// Owned native connection.
///
/// Closed exactly once: either explicitly through [`RawConnection::close`]
/// (which surfaces the engine's result) or on drop.
#[derive(Debug)]
pub struct RawConnection {
    db: NonNull<ffi::sqlite3>,
}

// SAFETY: the handle is only ever used through `&self`/`&mut self` while the
// owning `ConnectionInner` mutex is held, so no two threads call into the same
// connection concurrently. The bundled library is compiled thread-safe.
unsafe impl Send for RawConnection {}

impl RawConnection {
    /// Open a database file (or `:memory:` / URI) with the given flags.
    pub fn open(path: &str, flags: OpenFlags) -> Result<Self> {
        let c_path = CString::new(path)
            .map_err(|_| Error::argument("data_source", "contains an interior NUL byte"))?;
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();

        // SAFETY: c_path is NUL-terminated and outlives the call; db is a valid out-pointer.
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &raw mut db, flags.bits(), ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let err = error_from_handle(db, rc);
            if !db.is_null() {
                // SAFETY: a failed open still allocates a handle that must be released.
                unsafe { ffi::sqlite3_close(db) };
            }
            return Err(err);
        }

        let db = NonNull::new(db).ok_or_else(|| error_from_handle(db, ffi::SQLITE_NOMEM))?;

        // SAFETY: db is a freshly opened, valid handle.
        unsafe { ffi::sqlite3_extended_result_codes(db.as_ptr(), 1) };

        tracing::debug!(path, flags = flags.bits(), "opened native connection");
        Ok(Self { db })
    }

    /// Close the connection, surfacing the engine result.
    ///
    /// All statements must have been finalized first. If the engine refuses
    /// (`SQLITE_BUSY`), the handle is handed to `sqlite3_close_v2` so it is
    /// still released once its statements go away, and the error is returned.
    pub fn close(self) -> Result<()> {
        let db = self.db.as_ptr();
        std::mem::forget(self);

        // SAFETY: db is valid and, after forget, owned solely by this call.
        let rc = unsafe { ffi::sqlite3_close(db) };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }

        let err = error_from_handle(db, rc);
        // SAFETY: the handle is still open after a failed sqlite3_close; close_v2
        // defers the release until its remaining statements are finalized.
        unsafe { sqlite3_close_v2(db) };
        Err(err)
    }

    /// Raw handle for error translation.
    pub(crate) const fn as_ptr(&self) -> *mut ffi::sqlite3 {
        self.db.as_ptr()
    }

    /// Translate a failing result code using this connection's error state.
    #[must_use]
    pub fn error(&self, rc: c_int) -> Error {
        error_from_handle(self.as_ptr(), rc)
    }

    /// Most recent error message reported by the engine.
    #[must_use]
    pub fn errmsg(&self) -> String {
        // SAFETY: the handle is valid; the returned string is copied immediately.
        unsafe { cstr_to_string(ffi::sqlite3_errmsg(self.as_ptr())) }.unwrap_or_default()
    }

    /// Compile the first statement found at `offset` in `sql`.
    ///
    /// `consumed` reports how far the engine advanced, so callers can loop
    /// until the whole text is used. Trailing whitespace or comments yield
    /// `statement: None`.
    pub fn prepare(&self, sql: &str, offset: usize) -> Result<Prepared> {
        let rest = sql.get(offset..).ok_or_else(|| {
            Error::index_out_of_range(format!("offset {offset} in command text of {} bytes", sql.len()))
        })?;
        let len = c_int::try_from(rest.len())
            .map_err(|_| Error::sqlite(ffi::SQLITE_TOOBIG, "command text is too long"))?;

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();

        // SAFETY: rest points to `len` readable bytes; stmt and tail are valid out-pointers.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.as_ptr(),
                rest.as_ptr().cast::<c_char>(),
                len,
                &raw mut stmt,
                &raw mut tail,
            )
        };

        if rc != ffi::SQLITE_OK {
            let err = self.error(rc);
            if !stmt.is_null() {
                // SAFETY: the engine handed us a statement we must not leak.
                unsafe { ffi::sqlite3_finalize(stmt) };
            }
            return Err(err);
        }

        let consumed = if tail.is_null() {
            rest.len()
        } else {
            // SAFETY: tail points into `rest` (or one past its end) per the prepare contract.
            let advanced = unsafe { tail.cast::<u8>().offset_from(rest.as_ptr()) };
            usize::try_from(advanced).unwrap_or(rest.len())
        };

        let statement = NonNull::new(stmt).map(RawStatement::from_raw);
        Ok(Prepared {
            statement,
            consumed,
        })
    }

    /// Run every statement in `sql` to completion, discarding rows.
    ///
    /// Used for transaction control and connection setup pragmas.
    pub fn exec(&self, sql: &str) -> Result<()> {
        let mut offset = 0;
        while offset < sql.len() {
            let prepared = self.prepare(sql, offset)?;
            offset += prepared.consumed;
            let Some(statement) = prepared.statement else {
                break;
            };
            let stepped = loop {
                match statement.step() {
                    Ok(super::StepResult::Row) => {}
                    Ok(super::StepResult::Done) => break Ok(()),
                    Err(err) => break Err(err),
                }
            };
            // finalize echoes a failed step; the step error is the one to report
            let finalized = statement.finalize();
            stepped?;
            finalized?;
        }
        Ok(())
    }

    /// Rows changed by the most recent INSERT/UPDATE/DELETE.
    #[must_use]
    pub fn changes(&self) -> i64 {
        // SAFETY: the handle is valid.
        i64::from(unsafe { ffi::sqlite3_changes(self.as_ptr()) })
    }

    /// Rows changed since the connection was opened.
    #[must_use]
    pub fn total_changes(&self) -> i64 {
        // SAFETY: the handle is valid.
        i64::from(unsafe { ffi::sqlite3_total_changes(self.as_ptr()) })
    }

    /// Rowid of the most recent successful INSERT.
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        // SAFETY: the handle is valid.
        unsafe { ffi::sqlite3_last_insert_rowid(self.as_ptr()) }
    }

    /// True unless a transaction is open on this connection.
    #[must_use]
    pub fn is_autocommit(&self) -> bool {
        // SAFETY: the handle is valid.
        unsafe { ffi::sqlite3_get_autocommit(self.as_ptr()) != 0 }
    }

    /// Install a busy handler that sleeps up to `timeout` on a locked database.
    pub fn busy_timeout(&self, timeout: Duration) -> Result<()> {
        let ms = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
        // SAFETY: the handle is valid.
        let rc = unsafe { ffi::sqlite3_busy_timeout(self.as_ptr(), ms) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(rc))
        }
    }

    /// File backing the `main` database; empty for in-memory databases.
    #[must_use]
    pub fn filename(&self) -> String {
        // SAFETY: the handle is valid and the schema name is a static C string.
        unsafe { cstr_to_string(ffi::sqlite3_db_filename(self.as_ptr(), c"main".as_ptr())) }
            .unwrap_or_default()
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        // SAFETY: the handle is valid and released exactly once here.
        unsafe { sqlite3_close_v2(self.db.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::StepResult;

    #[test]
    fn test_open_in_memory() {
        let conn = RawConnection::open(":memory:", OpenFlags::default()).unwrap();
        assert!(conn.is_autocommit());
        assert!(conn.filename().is_empty());
        conn.close().unwrap();
    }

    #[test]
    fn test_open_missing_directory_is_cantopen() {
        let err = RawConnection::open("/nonexistent/dir/db.sqlite", OpenFlags::default()).unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(ffi::SQLITE_CANTOPEN));
    }

    #[test]
    fn test_prepare_reports_consumed_bytes() {
        let conn = RawConnection::open(":memory:", OpenFlags::default()).unwrap();
        let sql = "SELECT 1; SELECT 2;  -- trailing comment\n";

        let first = conn.prepare(sql, 0).unwrap();
        assert!(first.statement.is_some());
        assert_eq!(&sql[..first.consumed], "SELECT 1;");

        let second = conn.prepare(sql, first.consumed).unwrap();
        assert!(second.statement.is_some());

        let offset = first.consumed + second.consumed;
        let third = conn.prepare(sql, offset).unwrap();
        assert!(third.statement.is_none());
        assert_eq!(offset + third.consumed, sql.len());
    }

    #[test]
    fn test_prepare_syntax_error() {
        let conn = RawConnection::open(":memory:", OpenFlags::default()).unwrap();
        let err = conn.prepare("SELEC 1", 0).unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(ffi::SQLITE_ERROR));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_exec_and_changes() {
        let conn = RawConnection::open(":memory:", OpenFlags::default()).unwrap();
        conn.exec("CREATE TABLE t(a); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        assert_eq!(conn.changes(), 2);
        assert_eq!(conn.total_changes(), 2);
        assert_eq!(conn.last_insert_rowid(), 2);

        conn.exec("BEGIN").unwrap();
        assert!(!conn.is_autocommit());
        conn.exec("ROLLBACK").unwrap();
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_close_with_live_statement_is_busy() {
        let conn = RawConnection::open(":memory:", OpenFlags::default()).unwrap();
        let stmt = conn.prepare("SELECT 1", 0).unwrap().statement.unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        let err = conn.close().unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(ffi::SQLITE_BUSY));
        // deferred close completes once the statement is finalized
        stmt.finalize().unwrap();
    }

    #[test]
    fn test_drop_with_live_statement_defers_close() {
        let conn = RawConnection::open(":memory:", OpenFlags::default()).unwrap();
        let stmt = conn.prepare("SELECT 1", 0).unwrap().statement.unwrap();
        drop(conn);
        // the zombie handle is released here
        stmt.finalize().unwrap();
    }

    #[test]
    fn test_open_flags() {
        let flags = OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::URI;
        assert!(flags.contains(OpenFlags::CREATE));
        assert!(!flags.contains(OpenFlags::READ_ONLY));
        assert_eq!(OpenFlags::default(), OpenFlags::READ_WRITE | OpenFlags::CREATE);
    }
}
