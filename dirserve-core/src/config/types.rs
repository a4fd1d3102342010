//! Configuration type definitions
//!
//! These types represent the runtime configuration for dirserve.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for dirserve
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirserveConfig {
    /// Debug mode
    #[serde(default)]
    pub debug: bool,

    /// Listener and content root
    #[serde(default)]
    pub server: ServerConfig,

    /// Directory listing options
    #[serde(default)]
    pub listing: ListingConfig,

    /// Cross-origin headers
    #[serde(default)]
    pub cors: CorsConfig,

    /// Global logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DirserveConfig {
    /// Check the values that cannot be expressed in the type system.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }

        if self.server.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".to_string()));
        }

        if self.server.max_connections == Some(0) {
            return Err(Error::Config("max_connections must be greater than zero".to_string()));
        }

        match std::fs::metadata(&self.server.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::Config(format!(
                    "content root is not a directory: {}",
                    self.server.root.display()
                )));
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "content root {} is not accessible: {}",
                    self.server.root.display(),
                    e
                )));
            }
        }

        if let Some(tls) = &self.server.tls {
            if tls.cert.as_os_str().is_empty() {
                return Err(Error::Config("tls.cert must not be empty".to_string()));
            }
        }

        Ok(())
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Listen port (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory exposed to clients
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// TLS material; plaintext HTTP when absent
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Upper bound on requests served at once (None = unbounded); idle
    /// keep-alive connections do not count
    #[serde(default)]
    pub max_connections: Option<usize>,

    /// Read size used when streaming files, in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl ServerConfig {
    /// Socket address string (`bind:port`)
    pub fn listen_addr(&self) -> String {
        if self.bind.contains(':') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            root: default_root(),
            tls: None,
            max_connections: None,
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_chunk_size() -> usize {
    64 * 1024 // 64KB
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TlsConfig {
    /// Certificate chain file path (PEM)
    pub cert: PathBuf,

    /// Private key file path (PEM); read from `cert` when absent
    #[serde(default)]
    pub key: Option<PathBuf>,
}

/// Directory listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Entry order
    #[serde(default)]
    pub order: ListingOrder,

    /// Pretty-print the JSON body
    #[serde(default = "default_bool_true")]
    pub pretty: bool,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            order: ListingOrder::default(),
            pretty: true,
        }
    }
}

/// Listing sort orders
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListingOrder {
    /// Directories first, then name in byte order
    #[default]
    Name,
    /// Newest modification time first
    Modified,
}

impl std::str::FromStr for ListingOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "modified" | "mtime" => Ok(Self::Modified),
            other => Err(Error::Config(format!("Unknown listing order: {}", other))),
        }
    }
}

/// Cross-origin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Value of Access-Control-Allow-Origin
    #[serde(default = "default_allow_origin")]
    pub allow_origin: String,

    /// Pre-flight cache lifetime in seconds
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: default_allow_origin(),
            max_age: default_max_age(),
        }
    }
}

fn default_allow_origin() -> String {
    "*".to_string()
}

fn default_max_age() -> u64 {
    86400
}

fn default_bool_true() -> bool {
    true
}

/// Global logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Log file path (appended to, in addition to stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
