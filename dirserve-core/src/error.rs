//! Error types for dirserve

use thiserror::Error;

/// Result type for dirserve operations
pub type Result<T> = std::result::Result<T, Error>;

/// Startup and configuration errors.
///
/// Per-request failures never use this type; they live in
/// `dirserve_static::ServeError` and are turned into HTTP responses.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
