//! Owned `sqlite3_stmt*` statement handle.
//!
//! Lifecycle: Compiled → Bound → (Stepped ⇄ RowAvailable) → Reset → Finalized.
//! `finalize` consumes the handle, so use-after-finalize cannot be expressed.

use std::ffi::{CString, c_int, c_void};
use std::ptr::NonNull;

use libsqlite3_sys as ffi;

use super::{cstr_to_string, error_from_handle};
use crate::error::{Error, Result};
use crate::types::StorageClass;

/// Result of a successful `sqlite3_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available.
    Row,
    /// The statement has finished executing.
    Done,
}

/// Owned compiled statement.
#[derive(Debug)]
pub struct RawStatement {
    stmt: NonNull<ffi::sqlite3_stmt>,
}

// SAFETY: statements are stored in the connection's handle arena and are only
// touched while the owning `ConnectionInner` mutex is held.
unsafe impl Send for RawStatement {}

impl RawStatement {
    pub(super) const fn from_raw(stmt: NonNull<ffi::sqlite3_stmt>) -> Self {
        Self { stmt }
    }

    const fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.stmt.as_ptr()
    }

    fn db(&self) -> *mut ffi::sqlite3 {
        // SAFETY: the statement is valid; the owning connection outlives it.
        unsafe { ffi::sqlite3_db_handle(self.as_ptr()) }
    }

    fn check(&self, rc: c_int) -> Result<()> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(error_from_handle(self.db(), rc))
        }
    }

    /// Original SQL text of this statement.
    #[must_use]
    pub fn sql(&self) -> String {
        // SAFETY: the statement is valid; the text is copied immediately.
        unsafe { cstr_to_string(ffi::sqlite3_sql(self.as_ptr())) }.unwrap_or_default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════════

    /// Advance the statement. Any code other than ROW/DONE is an error.
    pub fn step(&self) -> Result<StepResult> {
        // SAFETY: the statement is valid.
        let rc = unsafe { ffi::sqlite3_step(self.as_ptr()) };
        tracing::trace!(rc, "sqlite3_step");
        match rc {
            ffi::SQLITE_ROW => Ok(StepResult::Row),
            ffi::SQLITE_DONE => Ok(StepResult::Done),
            _ => Err(error_from_handle(self.db(), rc)),
        }
    }

    /// Rewind the statement so it can be stepped again. Bindings are kept.
    ///
    /// If the most recent step failed, the engine reports that failure again here.
    pub fn reset(&self) -> Result<()> {
        // SAFETY: the statement is valid.
        let rc = unsafe { ffi::sqlite3_reset(self.as_ptr()) };
        self.check(rc)
    }

    /// Release the statement.
    pub fn finalize(self) -> Result<()> {
        let stmt = self.as_ptr();
        let db = self.db();
        std::mem::forget(self);
        // SAFETY: stmt is valid and, after forget, finalized exactly once here.
        let rc = unsafe { ffi::sqlite3_finalize(stmt) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(error_from_handle(db, rc))
        }
    }

    /// True if the statement makes no direct changes to the database file.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        // SAFETY: the statement is valid.
        unsafe { ffi::sqlite3_stmt_readonly(self.as_ptr()) != 0 }
    }

    /// True if the statement has been stepped but not run to completion or reset.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        // SAFETY: the statement is valid.
        unsafe { ffi::sqlite3_stmt_busy(self.as_ptr()) != 0 }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Binding (1-based parameter indexes)
    // ═══════════════════════════════════════════════════════════════════════

    /// Number of SQL parameters (largest index).
    #[must_use]
    pub fn bind_parameter_count(&self) -> usize {
        // SAFETY: the statement is valid.
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.as_ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Name of a parameter including its prefix (`:a`, `@a`, `$a`, `?3`), or
    /// `None` for anonymous `?` parameters.
    #[must_use]
    pub fn bind_parameter_name(&self, index: usize) -> Option<String> {
        // SAFETY: the statement is valid; out-of-range indexes return NULL.
        unsafe { cstr_to_string(ffi::sqlite3_bind_parameter_name(self.as_ptr(), index as c_int)) }
    }

    /// Index of a named parameter (name including prefix).
    #[must_use]
    pub fn bind_parameter_index(&self, name: &str) -> Option<usize> {
        let c_name = CString::new(name).ok()?;
        // SAFETY: the statement is valid and c_name is NUL-terminated.
        let index = unsafe { ffi::sqlite3_bind_parameter_index(self.as_ptr(), c_name.as_ptr()) };
        usize::try_from(index).ok().filter(|index| *index > 0)
    }

    /// Reset every parameter to NULL.
    pub fn clear_bindings(&self) -> Result<()> {
        // SAFETY: the statement is valid.
        let rc = unsafe { ffi::sqlite3_clear_bindings(self.as_ptr()) };
        self.check(rc)
    }

    /// Bind NULL.
    pub fn bind_null(&self, index: usize) -> Result<()> {
        // SAFETY: the statement is valid.
        let rc = unsafe { ffi::sqlite3_bind_null(self.as_ptr(), index as c_int) };
        self.check(rc)
    }

    /// Bind a 64-bit integer.
    pub fn bind_int64(&self, index: usize, value: i64) -> Result<()> {
        // SAFETY: the statement is valid.
        let rc = unsafe { ffi::sqlite3_bind_int64(self.as_ptr(), index as c_int, value) };
        self.check(rc)
    }

    /// Bind a double.
    pub fn bind_double(&self, index: usize, value: f64) -> Result<()> {
        // SAFETY: the statement is valid.
        let rc = unsafe { ffi::sqlite3_bind_double(self.as_ptr(), index as c_int, value) };
        self.check(rc)
    }

    /// Bind UTF-8 text. The engine copies the bytes.
    pub fn bind_text(&self, index: usize, value: &str) -> Result<()> {
        let len = c_int::try_from(value.len())
            .map_err(|_| Error::sqlite(ffi::SQLITE_TOOBIG, "text parameter is too long"))?;
        // SAFETY: value points to `len` bytes; SQLITE_TRANSIENT makes the engine copy them.
        let rc = unsafe {
            ffi::sqlite3_bind_text(
                self.as_ptr(),
                index as c_int,
                value.as_ptr().cast(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        };
        self.check(rc)
    }

    /// Bind a BLOB. The engine copies the bytes; empty slices bind a zero-length blob.
    pub fn bind_blob(&self, index: usize, value: &[u8]) -> Result<()> {
        if value.is_empty() {
            // SAFETY: the statement is valid.
            let rc = unsafe { ffi::sqlite3_bind_zeroblob(self.as_ptr(), index as c_int, 0) };
            return self.check(rc);
        }

        let len = c_int::try_from(value.len())
            .map_err(|_| Error::sqlite(ffi::SQLITE_TOOBIG, "blob parameter is too long"))?;
        // SAFETY: value points to `len` bytes; SQLITE_TRANSIENT makes the engine copy them.
        let rc = unsafe {
            ffi::sqlite3_bind_blob(
                self.as_ptr(),
                index as c_int,
                value.as_ptr().cast::<c_void>(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        };
        self.check(rc)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Column access (0-based ordinals, validated by the caller)
    // ═══════════════════════════════════════════════════════════════════════

    /// Number of result columns; zero for statements that return no data.
    #[must_use]
    pub fn column_count(&self) -> usize {
        // SAFETY: the statement is valid.
        let count = unsafe { ffi::sqlite3_column_count(self.as_ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Column name as reported by the engine.
    #[must_use]
    pub fn column_name(&self, ordinal: usize) -> String {
        // SAFETY: the statement is valid; the name is copied immediately.
        unsafe { cstr_to_string(ffi::sqlite3_column_name(self.as_ptr(), ordinal as c_int)) }
            .unwrap_or_default()
    }

    /// Declared type of a table column; `None` for expressions.
    #[must_use]
    pub fn column_decltype(&self, ordinal: usize) -> Option<String> {
        // SAFETY: the statement is valid; the name is copied immediately.
        unsafe { cstr_to_string(ffi::sqlite3_column_decltype(self.as_ptr(), ordinal as c_int)) }
    }

    /// Storage class of the value in the current row.
    #[must_use]
    pub fn column_type(&self, ordinal: usize) -> StorageClass {
        // SAFETY: the statement is valid.
        let code = unsafe { ffi::sqlite3_column_type(self.as_ptr(), ordinal as c_int) };
        StorageClass::from_code(code)
    }

    /// Current row value as a 64-bit integer.
    #[must_use]
    pub fn column_int64(&self, ordinal: usize) -> i64 {
        // SAFETY: the statement is valid.
        unsafe { ffi::sqlite3_column_int64(self.as_ptr(), ordinal as c_int) }
    }

    /// Current row value as a double.
    #[must_use]
    pub fn column_double(&self, ordinal: usize) -> f64 {
        // SAFETY: the statement is valid.
        unsafe { ffi::sqlite3_column_double(self.as_ptr(), ordinal as c_int) }
    }

    /// Current row value as UTF-8 text.
    #[must_use]
    pub fn column_text(&self, ordinal: usize) -> String {
        String::from_utf8_lossy(&self.column_bytes(ordinal, true)).into_owned()
    }

    /// Current row value as raw bytes.
    #[must_use]
    pub fn column_blob(&self, ordinal: usize) -> Vec<u8> {
        self.column_bytes(ordinal, false)
    }

    fn column_bytes(&self, ordinal: usize, text: bool) -> Vec<u8> {
        let index = ordinal as c_int;
        // SAFETY: the statement is valid. The pointer must be fetched before
        // sqlite3_column_bytes and is valid until the next step/reset/finalize;
        // the bytes are copied before returning.
        unsafe {
            let ptr: *const u8 = if text {
                ffi::sqlite3_column_text(self.as_ptr(), index).cast()
            } else {
                ffi::sqlite3_column_blob(self.as_ptr(), index).cast()
            };
            let len = usize::try_from(ffi::sqlite3_column_bytes(self.as_ptr(), index)).unwrap_or(0);
            if ptr.is_null() || len == 0 {
                Vec::new()
            } else {
                std::slice::from_raw_parts(ptr, len).to_vec()
            }
        }
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        // SAFETY: the statement is valid and finalized exactly once here.
        unsafe { ffi::sqlite3_finalize(self.as_ptr()) };
    }
}
