//! Column reader: raw value extraction from the current row.

use crate::error::Result;
use crate::native::RawStatement;
use crate::types::{SqliteTypeMap, SqliteValue, StorageClass, Value};

/// Read the value at `ordinal` in its storage class.
///
/// `ordinal` must be in range and a row must be available.
pub(crate) fn read_column(statement: &RawStatement, ordinal: usize) -> SqliteValue {
    match statement.column_type(ordinal) {
        StorageClass::Null => SqliteValue::Null,
        StorageClass::Integer => SqliteValue::Integer(statement.column_int64(ordinal)),
        StorageClass::Real => SqliteValue::Real(statement.column_double(ordinal)),
        StorageClass::Text => SqliteValue::Text(statement.column_text(ordinal)),
        StorageClass::Blob => SqliteValue::Blob(statement.column_blob(ordinal)),
    }
}

/// Type map for the column, from its declared type and the current value.
pub(crate) fn resolve_map(
    statement: &RawStatement,
    ordinal: usize,
    storage_class: StorageClass,
) -> &'static SqliteTypeMap {
    let declared = statement.column_decltype(ordinal);
    SqliteTypeMap::for_declared_type(declared.as_deref(), storage_class)
}

/// Type-erased read: NULL is the null sentinel, anything else goes through
/// the declared-type map.
pub(crate) fn read_value(statement: &RawStatement, ordinal: usize) -> Result<Value> {
    let raw = read_column(statement, ordinal);
    let storage_class = raw.storage_class();
    if storage_class == StorageClass::Null {
        return Ok(Value::Null);
    }
    resolve_map(statement, ordinal, storage_class).read(raw)
}
