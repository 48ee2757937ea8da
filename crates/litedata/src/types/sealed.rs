//! Sealed trait for strongly typed column reads.
//!
//! External code can USE [`FromSqliteValue`] through
//! `DataReader::get_field_value::<T>()` but CANNOT implement it, so the set of
//! readable types stays in lockstep with the type-map table.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use uuid::Uuid;

use super::value::{FieldType, Value};
use crate::error::{Error, Result};

/// Private module that external crates cannot access.
pub(crate) mod private {
    /// Marker trait that seals [`super::FromSqliteValue`].
    pub trait Sealed {}
}

/// Types a column value can be read as.
///
/// This trait is sealed - external implementations are not allowed.
pub trait FromSqliteValue: private::Sealed + Sized {
    /// Field type whose converter produces this type, or `None` for
    /// [`Value`], which follows the column's declared type instead.
    const FIELD_TYPE: Option<FieldType>;

    /// Extract from a value already converted to [`Self::FIELD_TYPE`].
    fn from_value(value: Value) -> Result<Self>;

    /// Result of reading a NULL cell.
    fn from_null() -> Result<Self>;
}

macro_rules! impl_from_sqlite_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl private::Sealed for $ty {}

            impl FromSqliteValue for $ty {
                const FIELD_TYPE: Option<FieldType> = Some(FieldType::$variant);

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        Value::Null => Self::from_null(),
                        other => Err(Error::conversion(
                            FieldType::$variant,
                            format!("converter produced {other:?}"),
                        )),
                    }
                }

                fn from_null() -> Result<Self> {
                    Err(Error::null(FieldType::$variant))
                }
            }
        )*
    };
}

impl_from_sqlite_value! {
    bool => Boolean,
    u8 => Byte,
    i8 => SByte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Single,
    f64 => Double,
    BigDecimal => Decimal,
    char => Char,
    String => String,
    Vec<u8> => Blob,
    NaiveDateTime => DateTime,
    Uuid => Guid,
}

impl private::Sealed for Value {}

impl FromSqliteValue for Value {
    const FIELD_TYPE: Option<FieldType> = None;

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }

    fn from_null() -> Result<Self> {
        Ok(Self::Null)
    }
}

impl<T: FromSqliteValue> private::Sealed for Option<T> {}

impl<T: FromSqliteValue> FromSqliteValue for Option<T> {
    const FIELD_TYPE: Option<FieldType> = T::FIELD_TYPE;

    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }

    fn from_null() -> Result<Self> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_from_value() {
        assert_eq!(i32::from_value(Value::Int32(5)).unwrap(), 5);
        assert_eq!(String::from_value(Value::from("x")).unwrap(), "x");
        assert!(i32::from_value(Value::Int64(5)).unwrap_err().is_conversion());
    }

    #[test]
    fn test_null_handling() {
        let err = i64::from_null().unwrap_err();
        assert!(err.is_null());
        assert_eq!(Option::<i64>::from_null().unwrap(), None);
        assert_eq!(Value::from_null().unwrap(), Value::Null);
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
    }

    #[test]
    fn test_field_types() {
        assert_eq!(<u16 as FromSqliteValue>::FIELD_TYPE, Some(FieldType::UInt16));
        assert_eq!(<Option<Uuid> as FromSqliteValue>::FIELD_TYPE, Some(FieldType::Guid));
        assert_eq!(<Value as FromSqliteValue>::FIELD_TYPE, None);
    }
}
