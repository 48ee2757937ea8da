//! Native handle layer over the SQLite C API.
//!
//! Every `unsafe` call into `libsqlite3-sys` lives in this module. The rest of
//! the crate sees two move-only owners:
//!
//! - [`RawConnection`]: an open `sqlite3*`, closed exactly once
//! - [`RawStatement`]: a compiled `sqlite3_stmt*`, finalized exactly once
//!
//! Statements are parked in a [`HandleArena`] owned by the connection state
//! so that closing a connection can reset and finalize every statement that
//! is still alive, and so that stale references are detected by generation
//! instead of being dereferenced.

pub mod arena;
pub mod connection;
pub mod statement;

use std::ffi::{CStr, c_char, c_int};

use libsqlite3_sys as ffi;

pub use arena::{HandleArena, HandleId};
pub use connection::{OpenFlags, Prepared, RawConnection};
pub use statement::{RawStatement, StepResult};

use crate::error::Error;

/// Version string of the linked SQLite library.
#[must_use]
pub fn libversion() -> String {
    // SAFETY: sqlite3_libversion returns a pointer to a static NUL-terminated string.
    unsafe { cstr_to_string(ffi::sqlite3_libversion()) }.unwrap_or_default()
}

/// English description of a result code, independent of any connection.
#[must_use]
pub fn errstr(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a pointer to a static NUL-terminated string.
    unsafe { cstr_to_string(ffi::sqlite3_errstr(code)) }.unwrap_or_default()
}

/// Translate a failing result code into an [`Error`] using the connection's
/// last error state.
///
/// The extended code reported by the connection is used when it agrees with
/// `rc`; otherwise `rc` itself is reported with the connection message.
pub(crate) fn error_from_handle(db: *mut ffi::sqlite3, rc: c_int) -> Error {
    if db.is_null() {
        return Error::sqlite(rc, errstr(rc));
    }

    // SAFETY: db is a live connection handle owned by the caller.
    let (extended, message) = unsafe {
        (
            ffi::sqlite3_extended_errcode(db),
            cstr_to_string(ffi::sqlite3_errmsg(db)),
        )
    };

    let code = if extended & 0xff == rc & 0xff {
        extended
    } else {
        rc
    };
    Error::sqlite(code, message.unwrap_or_else(|| errstr(code)))
}

/// Copy a NUL-terminated C string into an owned `String`.
///
/// # Safety
///
/// `ptr` must be null or point to a valid NUL-terminated string that stays
/// alive for the duration of the call.
pub(crate) unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller.
    let cstr = unsafe { CStr::from_ptr(ptr) };
    Some(cstr.to_string_lossy().into_owned())
}
