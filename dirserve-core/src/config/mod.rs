//! Configuration for dirserve
//!
//! The configuration is assembled once at startup (file + command line) and
//! is read-only afterwards.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
