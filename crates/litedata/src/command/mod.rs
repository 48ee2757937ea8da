//! Command module.
//!
//! Provides:
//! - `Command`: compiles and executes (possibly multi-statement) SQL text
//! - `Parameter` / `Parameters`: values bound to placeholders

pub mod parameters;
pub mod wrapper;

pub use parameters::{Parameter, Parameters};
pub use wrapper::Command;
