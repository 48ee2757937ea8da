//! Type mapping between engine storage classes and client field types.
//!
//! # Modules
//!
//! - [`value`] - storage classes, field types and value containers
//! - [`affinity`] - declared-type affinity inference
//! - [`mapping`] - the process-wide [`SqliteTypeMap`] table
//! - [`sealed`] - the [`FromSqliteValue`] read trait

pub mod affinity;
pub mod mapping;
pub mod sealed;
pub mod value;

pub use affinity::Affinity;
pub use mapping::SqliteTypeMap;
pub use sealed::FromSqliteValue;
pub use value::{FieldType, SqliteValue, StorageClass, Value};
