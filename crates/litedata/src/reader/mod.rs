//! Result cursor module.
//!
//! Provides:
//! - `DataReader`: forward-only cursor over a command's result sets
//! - the column reader that extracts typed values from the current row

pub mod column;
pub mod wrapper;


pub use wrapper::{DataReader, PrimedStatement};
