//! Bidirectional type-map table.
//!
//! One [`SqliteTypeMap`] exists per [`FieldType`]. Each carries the storage
//! class values of that type are written as, the canonical declared type
//! name, and a converter for each direction. The table is immutable and
//! process-wide.
//!
//! Two resolution entry points exist:
//!
//! - [`SqliteTypeMap::for_field_type`] when the caller names the type
//!   (parameter binding, `get_field_value::<T>()`)
//! - [`SqliteTypeMap::for_declared_type`] when the caller reads by ordinal
//!   (`get_value()`), using the column's declared type as a hint and the
//!   value's actual storage class as the authority

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::affinity::Affinity;
use super::value::{FieldType, SqliteValue, StorageClass, Value};
use crate::error::{Error, Result};

/// Text representation used when writing date/time values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const DATETIME_PARSE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Julian day number of 1970-01-01T00:00:00Z.
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;

/// 2^63, exclusive upper bound for i64.
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

type ReadFn = fn(SqliteValue) -> Result<Value>;
type WriteFn = fn(&Value) -> Result<SqliteValue>;

/// Mapping between one client field type and engine storage.
#[derive(Debug)]
pub struct SqliteTypeMap {
    field_type: FieldType,
    storage_class: StorageClass,
    declared_name: &'static str,
    read: ReadFn,
    write: WriteFn,
}

static TYPE_MAPS: [SqliteTypeMap; 17] = [
    SqliteTypeMap::new(FieldType::Boolean, StorageClass::Integer, "BOOLEAN", read_boolean, write_integral),
    SqliteTypeMap::new(FieldType::Byte, StorageClass::Integer, "TINYINT", read_byte, write_integral),
    SqliteTypeMap::new(FieldType::SByte, StorageClass::Integer, "TINYINT", read_sbyte, write_integral),
    SqliteTypeMap::new(FieldType::Int16, StorageClass::Integer, "SMALLINT", read_int16, write_integral),
    SqliteTypeMap::new(FieldType::UInt16, StorageClass::Integer, "INTEGER", read_uint16, write_integral),
    SqliteTypeMap::new(FieldType::Int32, StorageClass::Integer, "INTEGER", read_int32, write_integral),
    SqliteTypeMap::new(FieldType::UInt32, StorageClass::Integer, "INTEGER", read_uint32, write_integral),
    SqliteTypeMap::new(FieldType::Int64, StorageClass::Integer, "INTEGER", read_int64, write_integral),
    SqliteTypeMap::new(FieldType::UInt64, StorageClass::Integer, "INTEGER", read_uint64, write_integral),
    SqliteTypeMap::new(FieldType::Single, StorageClass::Real, "SINGLE", read_single, write_real),
    SqliteTypeMap::new(FieldType::Double, StorageClass::Real, "REAL", read_double, write_real),
    SqliteTypeMap::new(FieldType::Decimal, StorageClass::Text, "DECIMAL", read_decimal, write_text),
    SqliteTypeMap::new(FieldType::Char, StorageClass::Text, "CHAR", read_char, write_text),
    SqliteTypeMap::new(FieldType::String, StorageClass::Text, "TEXT", read_string, write_text),
    SqliteTypeMap::new(FieldType::Blob, StorageClass::Blob, "BLOB", read_blob, write_blob),
    SqliteTypeMap::new(FieldType::DateTime, StorageClass::Text, "DATETIME", read_datetime, write_text),
    SqliteTypeMap::new(FieldType::Guid, StorageClass::Blob, "GUID", read_guid, write_blob),
];

/// Well-known declared type names that carry more information than their
/// affinity. Keys are upper case with any `(precision, scale)` suffix removed.
static DECLARED_TYPES: LazyLock<HashMap<&'static str, FieldType>> = LazyLock::new(|| {
    [
        ("BIT", FieldType::Boolean),
        ("BOOL", FieldType::Boolean),
        ("BOOLEAN", FieldType::Boolean),
        ("TINYINT", FieldType::Byte),
        ("SMALLINT", FieldType::Int16),
        ("INT2", FieldType::Int16),
        ("MEDIUMINT", FieldType::Int32),
        ("INT4", FieldType::Int32),
        ("INT", FieldType::Int64),
        ("INTEGER", FieldType::Int64),
        ("BIGINT", FieldType::Int64),
        ("INT8", FieldType::Int64),
        ("UNSIGNED BIG INT", FieldType::UInt64),
        ("SINGLE", FieldType::Single),
        ("REAL", FieldType::Double),
        ("FLOAT", FieldType::Double),
        ("DOUBLE", FieldType::Double),
        ("DOUBLE PRECISION", FieldType::Double),
        ("DECIMAL", FieldType::Decimal),
        ("MONEY", FieldType::Decimal),
        ("SMALLMONEY", FieldType::Decimal),
        ("CURRENCY", FieldType::Decimal),
        ("CHAR", FieldType::String),
        ("NCHAR", FieldType::String),
        ("VARCHAR", FieldType::String),
        ("NVARCHAR", FieldType::String),
        ("TEXT", FieldType::String),
        ("NTEXT", FieldType::String),
        ("CLOB", FieldType::String),
        ("STRING", FieldType::String),
        ("BLOB", FieldType::Blob),
        ("BINARY", FieldType::Blob),
        ("VARBINARY", FieldType::Blob),
        ("IMAGE", FieldType::Blob),
        ("DATE", FieldType::DateTime),
        ("DATETIME", FieldType::DateTime),
        ("DATETIME2", FieldType::DateTime),
        ("SMALLDATETIME", FieldType::DateTime),
        ("TIMESTAMP", FieldType::DateTime),
        ("GUID", FieldType::Guid),
        ("UNIQUEIDENTIFIER", FieldType::Guid),
        ("UUID", FieldType::Guid),
    ]
    .into_iter()
    .collect()
});

impl SqliteTypeMap {
    const fn new(
        field_type: FieldType,
        storage_class: StorageClass,
        declared_name: &'static str,
        read: ReadFn,
        write: WriteFn,
    ) -> Self {
        Self {
            field_type,
            storage_class,
            declared_name,
            read,
            write,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Resolution
    // ═══════════════════════════════════════════════════════════════════════

    /// Map for a field type named by the caller.
    #[must_use]
    pub fn for_field_type(field_type: FieldType) -> &'static Self {
        &TYPE_MAPS[field_type as usize]
    }

    /// Natural map for a storage class when nothing else is known.
    ///
    /// NULL falls back to the BLOB map, matching the affinity of a column
    /// without a declared type.
    #[must_use]
    pub fn for_storage_class(storage_class: StorageClass) -> &'static Self {
        Self::for_field_type(match storage_class {
            StorageClass::Integer => FieldType::Int64,
            StorageClass::Real => FieldType::Double,
            StorageClass::Text => FieldType::String,
            StorageClass::Null | StorageClass::Blob => FieldType::Blob,
        })
    }

    /// Map for an ordinal read, from the column's declared type and the
    /// current value's storage class.
    ///
    /// A well-known declared name wins when the value's storage class is one
    /// its converter reads natively. Otherwise the storage class governs.
    /// For NULL values (no row, or a NULL cell) the declared name and then
    /// its affinity decide, so metadata still reflects the schema.
    #[must_use]
    pub fn for_declared_type(declared: Option<&str>, storage_class: StorageClass) -> &'static Self {
        let known = declared.and_then(known_declared_type);

        if storage_class == StorageClass::Null {
            return known.map_or_else(
                || {
                    let affinity = Affinity::from_declared_type(declared);
                    match affinity.storage_class() {
                        Some(natural) => Self::for_storage_class(natural),
                        None => Self::for_field_type(FieldType::Double),
                    }
                },
                Self::for_field_type,
            );
        }

        match known {
            Some(field_type) if reads_natively(field_type, storage_class) => {
                Self::for_field_type(field_type)
            }
            _ => Self::for_storage_class(storage_class),
        }
    }

    /// Map used to bind a parameter value, honouring a forced field type.
    #[must_use]
    pub fn for_value(value: &Value, forced: Option<FieldType>) -> Option<&'static Self> {
        forced.or_else(|| value.field_type()).map(Self::for_field_type)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Client field type.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Storage class values of this type are written as.
    #[must_use]
    pub const fn storage_class(&self) -> StorageClass {
        self.storage_class
    }

    /// Canonical declared type name.
    #[must_use]
    pub const fn declared_name(&self) -> &'static str {
        self.declared_name
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Conversion
    // ═══════════════════════════════════════════════════════════════════════

    /// Convert a stored value to this map's field type. NULL stays NULL.
    pub fn read(&self, value: SqliteValue) -> Result<Value> {
        if matches!(value, SqliteValue::Null) {
            return Ok(Value::Null);
        }
        (self.read)(value)
    }

    /// Convert a client value to storage as this map's field type.
    ///
    /// A value of another field type is first written in its own
    /// representation and read back as this type, so forcing `Int32` on the
    /// string `"12"` stores the integer 12.
    pub fn write(&self, value: &Value) -> Result<SqliteValue> {
        let Some(own) = value.field_type() else {
            return Ok(SqliteValue::Null);
        };
        if own == self.field_type {
            return (self.write)(value);
        }
        let stored = Self::for_field_type(own).write(value)?;
        let coerced = (self.read)(stored)?;
        (self.write)(&coerced)
    }
}

fn known_declared_type(declared: &str) -> Option<FieldType> {
    let base = declared.split('(').next().unwrap_or(declared);
    let normalized = base.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
    DECLARED_TYPES.get(normalized.as_str()).copied()
}

/// Storage classes a field type's read converter handles without reinterpretation.
const fn reads_natively(field_type: FieldType, storage_class: StorageClass) -> bool {
    use StorageClass::{Blob, Integer, Real, Text};

    match field_type {
        FieldType::Boolean
        | FieldType::Byte
        | FieldType::SByte
        | FieldType::Int16
        | FieldType::UInt16
        | FieldType::Int32
        | FieldType::UInt32
        | FieldType::Int64
        | FieldType::UInt64 => matches!(storage_class, Integer),
        FieldType::Single | FieldType::Double => matches!(storage_class, Integer | Real),
        FieldType::Decimal | FieldType::DateTime => matches!(storage_class, Integer | Real | Text),
        FieldType::Char | FieldType::String => matches!(storage_class, Text),
        FieldType::Blob => matches!(storage_class, Blob),
        FieldType::Guid => matches!(storage_class, Blob | Text),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Read converters
// ═══════════════════════════════════════════════════════════════════════════

fn describe(value: &SqliteValue) -> String {
    match value {
        SqliteValue::Null => "NULL".to_owned(),
        SqliteValue::Integer(v) => format!("INTEGER {v}"),
        SqliteValue::Real(v) => format!("REAL {v}"),
        SqliteValue::Text(v) => format!("TEXT '{v}'"),
        SqliteValue::Blob(v) => format!("BLOB of {} bytes", v.len()),
    }
}

fn unreadable(field_type: FieldType, value: &SqliteValue) -> Error {
    Error::conversion(field_type, format!("{} cannot be read as {field_type}", describe(value)))
}

fn integral_f64(real: f64) -> Option<i64> {
    (real.fract() == 0.0 && (-I64_UPPER..I64_UPPER).contains(&real)).then_some(real as i64)
}

fn to_i64(value: &SqliteValue, field_type: FieldType) -> Result<i64> {
    match value {
        SqliteValue::Integer(v) => Ok(*v),
        SqliteValue::Real(v) => integral_f64(*v).ok_or_else(|| unreadable(field_type, value)),
        SqliteValue::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral_f64))
                .ok_or_else(|| unreadable(field_type, value))
        }
        SqliteValue::Null | SqliteValue::Blob(_) => Err(unreadable(field_type, value)),
    }
}

fn to_f64(value: &SqliteValue, field_type: FieldType) -> Result<f64> {
    match value {
        SqliteValue::Integer(v) => Ok(*v as f64),
        SqliteValue::Real(v) => Ok(*v),
        SqliteValue::Text(s) => s.trim().parse::<f64>().map_err(|_| unreadable(field_type, value)),
        SqliteValue::Null | SqliteValue::Blob(_) => Err(unreadable(field_type, value)),
    }
}

fn narrow<T: TryFrom<i64>>(value: &SqliteValue, field_type: FieldType) -> Result<T> {
    let wide = to_i64(value, field_type)?;
    T::try_from(wide)
        .map_err(|_| Error::conversion(field_type, format!("{wide} is out of range for {field_type}")))
}

fn read_boolean(value: SqliteValue) -> Result<Value> {
    if let SqliteValue::Text(s) = &value {
        let s = s.trim();
        if s.eq_ignore_ascii_case("true") {
            return Ok(Value::Boolean(true));
        }
        if s.eq_ignore_ascii_case("false") {
            return Ok(Value::Boolean(false));
        }
    }
    if let SqliteValue::Real(r) = value {
        return Ok(Value::Boolean(r != 0.0));
    }
    to_i64(&value, FieldType::Boolean).map(|v| Value::Boolean(v != 0))
}

fn read_byte(value: SqliteValue) -> Result<Value> {
    narrow(&value, FieldType::Byte).map(Value::Byte)
}

fn read_sbyte(value: SqliteValue) -> Result<Value> {
    narrow(&value, FieldType::SByte).map(Value::SByte)
}

fn read_int16(value: SqliteValue) -> Result<Value> {
    narrow(&value, FieldType::Int16).map(Value::Int16)
}

fn read_uint16(value: SqliteValue) -> Result<Value> {
    narrow(&value, FieldType::UInt16).map(Value::UInt16)
}

fn read_int32(value: SqliteValue) -> Result<Value> {
    narrow(&value, FieldType::Int32).map(Value::Int32)
}

fn read_uint32(value: SqliteValue) -> Result<Value> {
    narrow(&value, FieldType::UInt32).map(Value::UInt32)
}

fn read_int64(value: SqliteValue) -> Result<Value> {
    to_i64(&value, FieldType::Int64).map(Value::Int64)
}

fn read_uint64(value: SqliteValue) -> Result<Value> {
    // text may carry values above i64::MAX
    if let SqliteValue::Text(s) = &value {
        if let Ok(v) = s.trim().parse::<u64>() {
            return Ok(Value::UInt64(v));
        }
    }
    narrow(&value, FieldType::UInt64).map(Value::UInt64)
}

fn read_single(value: SqliteValue) -> Result<Value> {
    let wide = to_f64(&value, FieldType::Single)?;
    let single = wide as f32;
    if wide.is_finite() && single.is_infinite() {
        return Err(Error::conversion(FieldType::Single, format!("{wide} is out of range for Single")));
    }
    Ok(Value::Single(single))
}

fn read_double(value: SqliteValue) -> Result<Value> {
    to_f64(&value, FieldType::Double).map(Value::Double)
}

fn read_decimal(value: SqliteValue) -> Result<Value> {
    let decimal = match &value {
        SqliteValue::Integer(v) => Some(BigDecimal::from(*v)),
        SqliteValue::Real(v) => BigDecimal::from_str(&v.to_string()).ok(),
        SqliteValue::Text(s) => BigDecimal::from_str(s.trim()).ok(),
        SqliteValue::Null | SqliteValue::Blob(_) => None,
    };
    decimal
        .map(Value::Decimal)
        .ok_or_else(|| unreadable(FieldType::Decimal, &value))
}

fn read_char(value: SqliteValue) -> Result<Value> {
    let ch = match &value {
        SqliteValue::Text(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        }
        SqliteValue::Integer(v) => u32::try_from(*v).ok().and_then(char::from_u32),
        _ => None,
    };
    ch.map(Value::Char)
        .ok_or_else(|| unreadable(FieldType::Char, &value))
}

fn format_real(real: f64) -> String {
    if real.is_finite() && real.fract() == 0.0 && real.abs() < 1e15 {
        format!("{real:.1}")
    } else {
        real.to_string()
    }
}

fn read_string(value: SqliteValue) -> Result<Value> {
    match value {
        SqliteValue::Text(s) => Ok(Value::String(s)),
        SqliteValue::Integer(v) => Ok(Value::String(v.to_string())),
        SqliteValue::Real(v) => Ok(Value::String(format_real(v))),
        SqliteValue::Blob(bytes) => String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|_| Error::conversion(FieldType::String, "BLOB is not valid UTF-8")),
        SqliteValue::Null => Ok(Value::Null),
    }
}

fn read_blob(value: SqliteValue) -> Result<Value> {
    match value {
        SqliteValue::Blob(bytes) => Ok(Value::Blob(bytes)),
        SqliteValue::Text(s) => Ok(Value::Blob(s.into_bytes())),
        other => Err(unreadable(FieldType::Blob, &other)),
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_PARSE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn from_julian_day(julian_day: f64) -> Option<NaiveDateTime> {
    let millis = ((julian_day - UNIX_EPOCH_JULIAN_DAY) * 86_400_000.0).round();
    if !millis.is_finite() || !(-I64_UPPER..I64_UPPER).contains(&millis) {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64).map(|dt| dt.naive_utc())
}

fn read_datetime(value: SqliteValue) -> Result<Value> {
    let parsed = match &value {
        SqliteValue::Text(s) => parse_datetime(s),
        SqliteValue::Real(jd) => from_julian_day(*jd),
        SqliteValue::Integer(secs) => DateTime::from_timestamp(*secs, 0).map(|dt| dt.naive_utc()),
        SqliteValue::Null | SqliteValue::Blob(_) => None,
    };
    parsed
        .map(Value::DateTime)
        .ok_or_else(|| unreadable(FieldType::DateTime, &value))
}

fn read_guid(value: SqliteValue) -> Result<Value> {
    let guid = match &value {
        SqliteValue::Blob(bytes) => Uuid::from_slice(bytes).ok(),
        SqliteValue::Text(s) => Uuid::parse_str(s.trim()).ok(),
        _ => None,
    };
    guid.map(Value::Guid)
        .ok_or_else(|| unreadable(FieldType::Guid, &value))
}

// ═══════════════════════════════════════════════════════════════════════════
// Write converters
// ═══════════════════════════════════════════════════════════════════════════

fn mismatched(value: &Value) -> Error {
    Error::conversion(
        value.field_type().unwrap_or(FieldType::Blob),
        "value does not match the converter's field type",
    )
}

fn write_integral(value: &Value) -> Result<SqliteValue> {
    let wide = match *value {
        Value::Boolean(v) => i64::from(v),
        Value::Byte(v) => i64::from(v),
        Value::SByte(v) => i64::from(v),
        Value::Int16(v) => i64::from(v),
        Value::UInt16(v) => i64::from(v),
        Value::Int32(v) => i64::from(v),
        Value::UInt32(v) => i64::from(v),
        Value::Int64(v) => v,
        Value::UInt64(v) => i64::try_from(v).map_err(|_| {
            Error::conversion(FieldType::UInt64, format!("{v} exceeds the 64-bit signed integer storage range"))
        })?,
        _ => return Err(mismatched(value)),
    };
    Ok(SqliteValue::Integer(wide))
}

fn write_real(value: &Value) -> Result<SqliteValue> {
    match *value {
        Value::Single(v) => Ok(SqliteValue::Real(f64::from(v))),
        Value::Double(v) => Ok(SqliteValue::Real(v)),
        _ => Err(mismatched(value)),
    }
}

fn write_text(value: &Value) -> Result<SqliteValue> {
    match value {
        Value::Decimal(v) => Ok(SqliteValue::Text(v.to_string())),
        Value::Char(v) => Ok(SqliteValue::Text(v.to_string())),
        Value::String(v) => Ok(SqliteValue::Text(v.clone())),
        Value::DateTime(v) => Ok(SqliteValue::Text(v.format(DATETIME_FORMAT).to_string())),
        _ => Err(mismatched(value)),
    }
}

fn write_blob(value: &Value) -> Result<SqliteValue> {
    match value {
        Value::Blob(v) => Ok(SqliteValue::Blob(v.clone())),
        Value::Guid(v) => Ok(SqliteValue::Blob(v.as_bytes().to_vec())),
        _ => Err(mismatched(value)),
    }
}
