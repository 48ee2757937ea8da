//! Connection module.
//!
//! Provides:
//! - `Connection`: open/closed state machine owning the native handle
//! - `ConnectionStringBuilder`: validated `key=value;` connection settings
//! - State types and state-change notifications

pub mod builder;
pub mod state;
pub mod wrapper;

pub use builder::{CacheMode, ConnectionStringBuilder, MEMORY_DATA_SOURCE, OpenMode};
pub use state::{ConnectionState, StateChange};
pub use wrapper::{Connection, ConnectionInner, SharedConnection};
