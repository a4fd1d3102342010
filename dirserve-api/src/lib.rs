//! Dirserve HTTP API
//!
//! Read-only JSON listing and download endpoints over a content root.

pub mod router;
pub mod server;

use dirserve_core::config::DirserveConfig;
use dirserve_core::{Error, Result};
use dirserve_static::{ContentRoot, FileServer, FileServerConfig};

pub use router::{CorsPolicy, ResponseBody, handle_request};
pub use server::{ServerOptions, bind, run_server};

/// State shared by every connection. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Content root access
    pub files: FileServer,
    /// Cross-origin headers added to every response
    pub cors: CorsPolicy,
}

impl AppState {
    /// Create state from its parts
    pub fn new(files: FileServer, cors: CorsPolicy) -> Self {
        Self { files, cors }
    }

    /// Canonicalize the configured root and capture the options
    pub fn from_config(config: &DirserveConfig) -> Result<Self> {
        let root = ContentRoot::new(&config.server.root).map_err(|e| {
            Error::Config(format!(
                "content root {} is not usable: {}",
                config.server.root.display(),
                e
            ))
        })?;

        Ok(Self {
            files: FileServer::new(FileServerConfig::from_config(root, config)),
            cors: CorsPolicy::from_config(&config.cors),
        })
    }
}
