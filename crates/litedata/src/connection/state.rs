//! Connection lifecycle states.

use std::fmt;

/// Whether a [`Connection`](super::Connection) holds a native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No native handle. Initial state.
    #[default]
    Closed,
    /// A native handle is open.
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("Closed"),
            Self::Open => f.write_str("Open"),
        }
    }
}

/// Notification raised on every real state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub original: ConnectionState,
    pub current: ConnectionState,
}

impl StateChange {
    pub(crate) const fn new(original: ConnectionState, current: ConnectionState) -> Self {
        Self { original, current }
    }
}
