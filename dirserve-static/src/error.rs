//! Request-level errors

use http::StatusCode;
use thiserror::Error;

/// Errors raised while serving a single request.
///
/// `Display` output may contain filesystem details and is meant for logs.
/// Clients only ever see [`ServeError::public_message`].
#[derive(Error, Debug)]
pub enum ServeError {
    /// Request path tried to leave the content root
    #[error("🚫 Path escapes content root")]
    PathEscape,

    /// Resolved path does not exist
    #[error("🔍 Not found: {0}")]
    NotFound(String),

    /// Method other than GET / OPTIONS
    #[error("⛔ Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Range header cannot be satisfied for a file of this size
    #[error("📏 Range not satisfiable (size {size})")]
    RangeNotSatisfiable { size: u64 },

    /// Read failed after the response head was sent
    #[error("💥 Transfer of {path} interrupted: {reason}")]
    TransferInterrupted { path: String, reason: String },

    /// A listing child could not be stat'd
    #[error("⚠️ Skipping unreadable entry {name}: {source}")]
    ListingEntryUnreadable {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other IO failure
    #[error("💥 IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServeError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::PathEscape | ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::ListingEntryUnreadable { .. } => StatusCode::NOT_FOUND,
            ServeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServeError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ServeError::TransferInterrupted { .. } | ServeError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to put in a response body. Never contains a path.
    pub fn public_message(&self) -> String {
        match self {
            ServeError::PathEscape | ServeError::NotFound(_) => "File not found".to_string(),
            ServeError::ListingEntryUnreadable { .. } => "File not found".to_string(),
            ServeError::MethodNotAllowed(method) => format!("Method {} not allowed", method),
            ServeError::RangeNotSatisfiable { size } => {
                format!("Requested range not satisfiable for {} byte file", size)
            }
            ServeError::TransferInterrupted { .. } | ServeError::Io(_) => {
                "Internal server error".to_string()
            }
        }
    }
}
