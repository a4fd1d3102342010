//! Dirserve Core Library
//!
//! This crate provides the pieces shared by every dirserve crate:
//! configuration types, configuration loading and the startup error type.

pub mod config;
pub mod error;

pub use error::{Error, Result};

/// Dirserve version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
