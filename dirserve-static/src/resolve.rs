//! Request path resolution
//!
//! 🛡️ Maps untrusted URL paths onto the content root and refuses anything
//! that would land outside of it.

use crate::error::ServeError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The canonicalized directory served to clients. Fixed at startup.
#[derive(Debug, Clone)]
pub struct ContentRoot {
    root: PathBuf,
}

/// A filesystem path proven to lie inside the content root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonical filesystem location
    pub fs_path: PathBuf,
    /// Decoded URL path as the client addressed it (`/docs/a.ppsx`)
    pub public_path: String,
}

impl ContentRoot {
    /// Canonicalize `path` and use it as the trust boundary
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = std::fs::canonicalize(path.as_ref())?;
        if !root.is_dir() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("content root is not a directory: {}", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// Canonical root path
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a raw request path (query and fragment allowed) to a
    /// location inside the root.
    pub async fn resolve(&self, raw_path: &str) -> Result<ResolvedPath, ServeError> {
        let (segments, trailing_slash) = split_request_path(raw_path)?;

        let mut candidate = self.root.clone();
        for segment in &segments {
            candidate.push(segment);
        }

        let canonical = match tokio::fs::canonicalize(&candidate).await {
            Ok(p) => p,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::debug!("🔍 Cannot canonicalize {}: {}", candidate.display(), e);
                }
                return Err(ServeError::NotFound(candidate.display().to_string()));
            }
        };

        if !canonical.starts_with(&self.root) {
            tracing::warn!("🚫 Blocked escape via symlink: {}", raw_path);
            return Err(ServeError::PathEscape);
        }

        let mut public_path = format!("/{}", segments.join("/"));
        if trailing_slash && !public_path.ends_with('/') {
            public_path.push('/');
        }

        Ok(ResolvedPath {
            fs_path: canonical,
            public_path,
        })
    }
}

/// Decode a request path into its relative segments.
///
/// Returns the segments (empty and `.` dropped) and whether the path ended
/// with a slash. Any `..` segment, NUL byte or non UTF-8 decoding is
/// rejected before the filesystem is touched.
pub(crate) fn split_request_path(raw_path: &str) -> Result<(Vec<String>, bool), ServeError> {
    let path = raw_path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let decoded = urlencoding::decode_binary(path.as_bytes());
    if decoded.contains(&0) {
        return Err(ServeError::PathEscape);
    }
    let decoded = std::str::from_utf8(&decoded).map_err(|_| ServeError::PathEscape)?;

    let trailing_slash = decoded.ends_with('/') || decoded.ends_with('\\');

    let mut segments = Vec::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(ServeError::PathEscape),
            s if is_drive_prefix(s) => return Err(ServeError::PathEscape),
            s => segments.push(s.to_string()),
        }
    }

    Ok((segments, trailing_slash))
}

// `C:` would make `PathBuf::push` replace the root on Windows
fn is_drive_prefix(segment: &str) -> bool {
    cfg!(windows) && segment.len() == 2 && segment.ends_with(':')
}
