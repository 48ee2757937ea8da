//! Forward-only result cursor.
//!
//! A [`DataReader`] walks the statements of one command execution that
//! produce columns. Each statement was stepped once during execution, so the
//! first [`DataReader::read`] on it reports that primed outcome instead of
//! stepping again. Once a statement reports no more rows the reader never
//! steps it again, because a finished statement would silently restart.
//!
//! The reader borrows its [`Command`] mutably, so the command cannot be
//! re-executed or re-targeted while the reader is alive. The connection's
//! single reader slot is held from execution until [`DataReader::close`] or
//! drop.

use std::marker::PhantomData;

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use parking_lot::MutexGuard;
use uuid::Uuid;

use super::column::{read_column, read_value, resolve_map};
use crate::command::Command;
use crate::connection::{ConnectionInner, SharedConnection};
use crate::error::{Error, Result};
use crate::native::{HandleId, RawStatement, StepResult};
use crate::types::{FieldType, FromSqliteValue, SqliteTypeMap, SqliteValue, StorageClass, Value};

/// A statement handed from execution to the reader.
#[derive(Debug, Clone, Copy)]
pub struct PrimedStatement {
    id: HandleId,
    has_rows: bool,
    faulted: bool,
}

impl PrimedStatement {
    pub(crate) const fn new(id: HandleId, has_rows: bool) -> Self {
        Self {
            id,
            has_rows,
            faulted: false,
        }
    }
}

/// Forward-only reader over the result sets of one command execution.
#[derive(Debug)]
pub struct DataReader<'a> {
    shared: SharedConnection,
    statements: Vec<PrimedStatement>,
    index: usize,
    has_read: bool,
    row_available: bool,
    exhausted: bool,
    closed: bool,
    records_affected: i64,
    token: u64,
    _command: PhantomData<&'a mut Command>,
}

impl DataReader<'_> {
    pub(crate) fn new(
        shared: SharedConnection,
        statements: Vec<PrimedStatement>,
        records_affected: i64,
        token: u64,
    ) -> Self {
        Self {
            shared,
            statements,
            index: 0,
            has_read: false,
            row_available: false,
            exhausted: false,
            closed: false,
            records_affected,
            token,
            _command: PhantomData,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // State
    // ═══════════════════════════════════════════════════════════════════════

    /// True after [`close`](Self::close), or once the connection was closed
    /// underneath the reader.
    pub fn is_closed(&self) -> bool {
        self.closed || self.shared.lock().reader() != Some(self.token)
    }

    /// Rows changed by the statements of the batch that return no columns,
    /// or -1 if none of them wrote. Captured at execution.
    pub const fn records_affected(&self) -> i64 {
        self.records_affected
    }

    /// True if the current result set produced at least one row.
    pub fn has_rows(&self) -> bool {
        !self.closed
            && self
                .statements
                .get(self.index)
                .is_some_and(|statement| statement.has_rows)
    }

    /// Number of columns in the current result set; zero if the batch
    /// produced none.
    pub fn field_count(&self) -> Result<usize> {
        let inner = self.lock_open("field_count")?;
        if self.statements.is_empty() {
            return Ok(0);
        }
        Ok(self.statement(&inner, "field_count")?.column_count())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Navigation
    // ═══════════════════════════════════════════════════════════════════════

    /// Advance to the next row of the current result set.
    ///
    /// Returns false once the result set is exhausted, and keeps returning
    /// false until [`next_result`](Self::next_result) succeeds.
    pub fn read(&mut self) -> Result<bool> {
        let inner = lock_reader(&self.shared, self.closed, self.token, "read")?;
        let Some(current) = self.statements.get(self.index).copied() else {
            return Ok(false);
        };
        if self.exhausted {
            return Ok(false);
        }

        if !self.has_read {
            self.has_read = true;
            self.row_available = current.has_rows;
            self.exhausted = !current.has_rows;
            return Ok(self.row_available);
        }

        let statement = inner
            .statements
            .get(current.id)
            .ok_or_else(|| closed_error("read"))?;
        match statement.step() {
            Ok(StepResult::Row) => {
                self.row_available = true;
                Ok(true)
            }
            Ok(StepResult::Done) => {
                self.row_available = false;
                self.exhausted = true;
                Ok(false)
            }
            Err(err) => {
                self.row_available = false;
                self.exhausted = true;
                self.statements[self.index].faulted = true;
                Err(err)
            }
        }
    }

    /// Advance to the next result set.
    ///
    /// Returns false when there is none; the reader then stays on the last
    /// result set with no row available.
    pub fn next_result(&mut self) -> Result<bool> {
        let inner = lock_reader(&self.shared, self.closed, self.token, "next_result")?;
        if self.index + 1 >= self.statements.len() {
            self.row_available = false;
            self.exhausted = true;
            return Ok(false);
        }

        let current = self.statements[self.index];
        let statement = inner
            .statements
            .get(current.id)
            .ok_or_else(|| closed_error("next_result"))?;
        if let Err(err) = statement.reset() {
            if !current.faulted {
                return Err(err);
            }
        }

        self.index += 1;
        self.has_read = false;
        self.row_available = false;
        self.exhausted = false;
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Metadata
    // ═══════════════════════════════════════════════════════════════════════

    /// Column name at `ordinal`.
    pub fn get_name(&self, ordinal: usize) -> Result<String> {
        self.with_column("get_name", ordinal, |statement| {
            Ok(statement.column_name(ordinal))
        })
    }

    /// Ordinal of the first column named `name` (case-sensitive).
    pub fn get_ordinal(&self, name: &str) -> Result<usize> {
        let inner = self.lock_open("get_ordinal")?;
        if self.statements.is_empty() {
            return Err(Error::column_not_found(name));
        }
        let statement = self.statement(&inner, "get_ordinal")?;
        (0..statement.column_count())
            .find(|&ordinal| statement.column_name(ordinal) == name)
            .ok_or_else(|| Error::column_not_found(name))
    }

    /// Declared type of the column, or the storage class name of the
    /// current value for expression columns.
    pub fn get_data_type_name(&self, ordinal: usize) -> Result<String> {
        self.with_column("get_data_type_name", ordinal, |statement| {
            if let Some(declared) = statement.column_decltype(ordinal) {
                return Ok(declared);
            }
            let storage_class = self.current_storage_class(statement, ordinal);
            Ok(SqliteTypeMap::for_storage_class(storage_class)
                .declared_name()
                .to_owned())
        })
    }

    /// Field type `get_value` would produce for the column.
    ///
    /// Without a current row only the declared type is consulted.
    pub fn get_field_type(&self, ordinal: usize) -> Result<FieldType> {
        self.with_column("get_field_type", ordinal, |statement| {
            let storage_class = self.current_storage_class(statement, ordinal);
            Ok(resolve_map(statement, ordinal, storage_class).field_type())
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Values
    // ═══════════════════════════════════════════════════════════════════════

    /// True if the current value is NULL.
    pub fn is_db_null(&self, ordinal: usize) -> Result<bool> {
        self.with_row("is_db_null", ordinal, |statement| {
            Ok(statement.column_type(ordinal) == StorageClass::Null)
        })
    }

    /// Current value, typed by the column's declared type and storage class.
    pub fn get_value(&self, ordinal: usize) -> Result<Value> {
        self.with_row("get_value", ordinal, |statement| {
            read_value(statement, ordinal)
        })
    }

    /// Fill `values` with the current row; returns how many were written.
    pub fn get_values(&self, values: &mut [Value]) -> Result<usize> {
        self.with_row("get_values", 0, |statement| {
            let count = values.len().min(statement.column_count());
            for (ordinal, slot) in values.iter_mut().take(count).enumerate() {
                *slot = read_value(statement, ordinal)?;
            }
            Ok(count)
        })
    }

    /// Current value converted to `T`.
    ///
    /// `T` selects the converter directly, independent of the declared type;
    /// [`Value`] defers to [`get_value`](Self::get_value). NULL fails unless
    /// `T` is an `Option` or [`Value`].
    pub fn get_field_value<T: FromSqliteValue>(&self, ordinal: usize) -> Result<T> {
        self.typed("get_field_value", ordinal)
    }

    fn typed<T: FromSqliteValue>(&self, operation: &'static str, ordinal: usize) -> Result<T> {
        self.with_row(operation, ordinal, |statement| {
            let raw = read_column(statement, ordinal);
            if matches!(raw, SqliteValue::Null) {
                return T::from_null();
            }
            let value = match T::FIELD_TYPE {
                Some(field_type) => SqliteTypeMap::for_field_type(field_type).read(raw)?,
                None => resolve_map(statement, ordinal, raw.storage_class()).read(raw)?,
            };
            T::from_value(value)
        })
    }

    pub fn get_boolean(&self, ordinal: usize) -> Result<bool> {
        self.typed("get_boolean", ordinal)
    }

    pub fn get_byte(&self, ordinal: usize) -> Result<u8> {
        self.typed("get_byte", ordinal)
    }

    pub fn get_sbyte(&self, ordinal: usize) -> Result<i8> {
        self.typed("get_sbyte", ordinal)
    }

    pub fn get_int16(&self, ordinal: usize) -> Result<i16> {
        self.typed("get_int16", ordinal)
    }

    pub fn get_uint16(&self, ordinal: usize) -> Result<u16> {
        self.typed("get_uint16", ordinal)
    }

    pub fn get_int32(&self, ordinal: usize) -> Result<i32> {
        self.typed("get_int32", ordinal)
    }

    pub fn get_uint32(&self, ordinal: usize) -> Result<u32> {
        self.typed("get_uint32", ordinal)
    }

    pub fn get_int64(&self, ordinal: usize) -> Result<i64> {
        self.typed("get_int64", ordinal)
    }

    pub fn get_uint64(&self, ordinal: usize) -> Result<u64> {
        self.typed("get_uint64", ordinal)
    }

    pub fn get_float(&self, ordinal: usize) -> Result<f32> {
        self.typed("get_float", ordinal)
    }

    pub fn get_double(&self, ordinal: usize) -> Result<f64> {
        self.typed("get_double", ordinal)
    }

    pub fn get_decimal(&self, ordinal: usize) -> Result<BigDecimal> {
        self.typed("get_decimal", ordinal)
    }

    pub fn get_char(&self, ordinal: usize) -> Result<char> {
        self.typed("get_char", ordinal)
    }

    pub fn get_string(&self, ordinal: usize) -> Result<String> {
        self.typed("get_string", ordinal)
    }

    pub fn get_blob(&self, ordinal: usize) -> Result<Vec<u8>> {
        self.typed("get_blob", ordinal)
    }

    pub fn get_datetime(&self, ordinal: usize) -> Result<NaiveDateTime> {
        self.typed("get_datetime", ordinal)
    }

    pub fn get_guid(&self, ordinal: usize) -> Result<Uuid> {
        self.typed("get_guid", ordinal)
    }

    /// Chunked BLOB access is not supported; read the whole value with
    /// [`get_blob`](Self::get_blob).
    pub fn get_bytes(&self, _ordinal: usize, _data_offset: usize, _buffer: &mut [u8]) -> Result<usize> {
        self.lock_open("get_bytes")?;
        Err(Error::not_supported("get_bytes: chunked BLOB access"))
    }

    /// Chunked text access is not supported; read the whole value with
    /// [`get_string`](Self::get_string).
    pub fn get_chars(&self, _ordinal: usize, _data_offset: usize, _buffer: &mut [char]) -> Result<usize> {
        self.lock_open("get_chars")?;
        Err(Error::not_supported("get_chars: chunked text access"))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Disposal
    // ═══════════════════════════════════════════════════════════════════════

    /// Reset every statement and release the connection's reader slot.
    ///
    /// Idempotent. Every statement is reset even if one fails; the first
    /// failure not already reported by [`read`](Self::read) is returned.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.row_available = false;

        let mut inner = self.shared.lock();
        let mut first_error: Option<Error> = None;
        for primed in self.statements.drain(..) {
            // finalized by Connection::close
            let Some(statement) = inner.statements.get(primed.id) else {
                continue;
            };
            if let Err(err) = statement.reset() {
                if !primed.faulted {
                    first_error.get_or_insert(err);
                }
            }
        }
        inner.release_reader(self.token);
        tracing::debug!(records_affected = self.records_affected, "data reader closed");

        first_error.map_or(Ok(()), Err)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════

    fn lock_open(&self, operation: &'static str) -> Result<MutexGuard<'_, ConnectionInner>> {
        lock_reader(&self.shared, self.closed, self.token, operation)
    }

    fn statement<'g>(&self, inner: &'g ConnectionInner, operation: &'static str) -> Result<&'g RawStatement> {
        let primed = self.statements.get(self.index).ok_or_else(|| {
            Error::invalid_operation(operation, "the command produced no result set")
        })?;
        inner
            .statements
            .get(primed.id)
            .ok_or_else(|| closed_error(operation))
    }

    /// Run `f` on the current statement after validating `ordinal`.
    fn with_column<R>(
        &self,
        operation: &'static str,
        ordinal: usize,
        f: impl FnOnce(&RawStatement) -> Result<R>,
    ) -> Result<R> {
        let inner = self.lock_open(operation)?;
        let statement = self.statement(&inner, operation)?;
        let field_count = statement.column_count();
        if ordinal >= field_count {
            return Err(Error::index_out_of_range(format!(
                "ordinal {ordinal} (field count is {field_count})"
            )));
        }
        f(statement)
    }

    /// Like [`with_column`](Self::with_column) but also requires a row.
    fn with_row<R>(
        &self,
        operation: &'static str,
        ordinal: usize,
        f: impl FnOnce(&RawStatement) -> Result<R>,
    ) -> Result<R> {
        self.with_column(operation, ordinal, |statement| {
            if !self.row_available {
                return Err(Error::invalid_operation(
                    operation,
                    "no row is available; call read first",
                ));
            }
            f(statement)
        })
    }

    fn current_storage_class(&self, statement: &RawStatement, ordinal: usize) -> StorageClass {
        if self.row_available {
            statement.column_type(ordinal)
        } else {
            StorageClass::Null
        }
    }
}

impl Drop for DataReader<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to close data reader on drop");
        }
    }
}

/// Lock the connection, failing if the reader is closed or the connection
/// no longer hands its reader slot to `token`.
fn lock_reader<'s>(
    shared: &'s SharedConnection,
    closed: bool,
    token: u64,
    operation: &'static str,
) -> Result<MutexGuard<'s, ConnectionInner>> {
    if closed {
        return Err(closed_error(operation));
    }
    let inner = shared.lock();
    if inner.reader() != Some(token) {
        return Err(closed_error(operation));
    }
    Ok(inner)
}

fn closed_error(operation: &'static str) -> Error {
    Error::invalid_operation(operation, "the data reader is closed")
}
