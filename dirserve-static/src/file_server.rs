//! File server implementation

use crate::error::ServeError;
use crate::listing::{DirectoryListing, generate_listing};
use crate::mime::{content_disposition, content_type_for};
use crate::resolve::{ContentRoot, ResolvedPath};
use bytes::Bytes;
use dirserve_core::config::{DirserveConfig, ListingOrder};
use futures::{Stream, StreamExt, TryStreamExt, future, stream};
use http::{HeaderValue, StatusCode};
use std::fs::Metadata;
use std::path::Path;
use std::io::{ErrorKind, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Configuration for the file server
#[derive(Debug, Clone)]
pub struct FileServerConfig {
    /// Root directory to serve
    pub root: ContentRoot,
    /// Listing sort order
    pub listing_order: ListingOrder,
    /// Pretty-print listing JSON
    pub pretty_listing: bool,
    /// Read size when streaming
    pub chunk_size: usize,
}

impl FileServerConfig {
    /// Defaults for everything but the root
    pub fn new(root: ContentRoot) -> Self {
        Self {
            root,
            listing_order: ListingOrder::default(),
            pretty_listing: true,
            chunk_size: 64 * 1024,
        }
    }

    /// Take listing and streaming options from the global configuration
    pub fn from_config(root: ContentRoot, config: &DirserveConfig) -> Self {
        Self {
            root,
            listing_order: config.listing.order,
            pretty_listing: config.listing.pretty,
            chunk_size: config.server.chunk_size,
        }
    }
}

/// Read-only server over one content root
#[derive(Debug, Clone)]
pub struct FileServer {
    config: FileServerConfig,
}

/// An opened file, positioned and ready to stream
#[derive(Debug)]
pub struct FileTransfer {
    file: tokio::fs::File,
    /// URL path, used in logs
    pub public_path: String,
    /// 200 or 206
    pub status: StatusCode,
    /// Bytes that will be sent
    pub length: u64,
    /// Full file size
    pub total_size: u64,
    pub content_type: &'static str,
    pub content_disposition: HeaderValue,
    pub content_range: Option<String>,
    pub last_modified: Option<String>,
}

/// Outcome of parsing a `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range, send everything
    Full,
    /// Inclusive byte range
    Partial { start: u64, end: u64 },
    /// Well-formed but outside the file
    Unsatisfiable,
}

impl FileServer {
    /// Create a new file server
    pub fn new(config: FileServerConfig) -> Self {
        Self { config }
    }

    /// Create a file server for a directory with default options
    pub fn serve_dir(root: ContentRoot) -> Self {
        Self::new(FileServerConfig::new(root))
    }

    /// Server configuration
    pub fn config(&self) -> &FileServerConfig {
        &self.config
    }

    /// Resolve a request path inside the content root
    pub async fn resolve(&self, path: &str) -> Result<ResolvedPath, ServeError> {
        self.config.root.resolve(path).await
    }

    /// Build the listing for a resolved directory
    pub async fn list(&self, dir: &ResolvedPath) -> Result<DirectoryListing, ServeError> {
        tracing::debug!("📂 Listing {}", dir.public_path);
        generate_listing(dir, self.config.listing_order).await
    }

    /// Open a resolved regular file, honouring an optional `Range` header
    pub async fn open(
        &self,
        resolved: ResolvedPath,
        metadata: &Metadata,
        range_header: Option<&str>,
    ) -> Result<FileTransfer, ServeError> {
        let total_size = metadata.len();

        let (status, start, length, content_range) = match parse_range(range_header, total_size) {
            RangeRequest::Full => (StatusCode::OK, 0, total_size, None),
            RangeRequest::Partial { start, end } => (
                StatusCode::PARTIAL_CONTENT,
                start,
                end - start + 1,
                Some(format!("bytes {}-{}/{}", start, end, total_size)),
            ),
            RangeRequest::Unsatisfiable => {
                return Err(ServeError::RangeNotSatisfiable { size: total_size });
            }
        };

        let mut file = tokio::fs::File::open(&resolved.fs_path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ServeError::NotFound(resolved.fs_path.display().to_string())
            } else {
                ServeError::Io(e)
            }
        })?;

        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }

        tracing::debug!(
            "📁 Sending {} ({} of {} bytes from offset {})",
            resolved.public_path,
            length,
            total_size,
            start
        );

        Ok(FileTransfer {
            file,
            status,
            length,
            total_size,
            content_type: content_type_for(&resolved.public_path),
            // Type and download name both follow the requested name, even
            // when it is a symlink alias
            content_disposition: content_disposition(Path::new(&resolved.public_path)),
            content_range,
            last_modified: metadata.modified().ok().map(httpdate::fmt_http_date),
            public_path: resolved.public_path,
        })
    }
}

impl FileTransfer {
    /// Stream the selected bytes in chunks of at most `chunk_size`.
    ///
    /// Read errors, and a file that shrinks under us, end the stream with an
    /// error so the connection is aborted instead of sending a short body.
    pub fn into_stream(
        self,
        chunk_size: usize,
    ) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        let expected = self.length;
        let path = self.public_path;
        let sent = Arc::new(AtomicU64::new(0));
        let counter = sent.clone();

        let body = ReaderStream::with_capacity(self.file.take(expected), chunk_size.max(1))
            .inspect_ok(move |chunk| {
                counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            });

        let tail = stream::once(async move {
            let got = sent.load(Ordering::Relaxed);
            if got < expected {
                Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("file shrank during transfer ({} of {} bytes sent)", got, expected),
                ))
            } else {
                Ok(Bytes::new())
            }
        })
        .try_filter(|chunk| future::ready(!chunk.is_empty()));

        body.chain(tail).inspect_err(move |e| {
            let err = ServeError::TransferInterrupted {
                path: path.clone(),
                reason: e.to_string(),
            };
            tracing::warn!("{}", err);
        })
    }
}

/// Parse a single `bytes=` range.
///
/// Missing, malformed and multi-range headers yield [`RangeRequest::Full`].
pub fn parse_range(header: Option<&str>, file_size: u64) -> RangeRequest {
    let Some(header) = header else {
        return RangeRequest::Full;
    };
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    if spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeRequest::Full;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    // Suffix form: last N bytes
    if start_str.is_empty() {
        let Ok(suffix) = end_str.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if suffix == 0 || file_size == 0 {
            return RangeRequest::Unsatisfiable;
        }
        return RangeRequest::Partial {
            start: file_size.saturating_sub(suffix),
            end: file_size - 1,
        };
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = if end_str.is_empty() {
        None
    } else {
        match end_str.parse::<u64>() {
            Ok(e) => Some(e),
            Err(_) => return RangeRequest::Full,
        }
    };

    if matches!(end, Some(e) if e < start) {
        return RangeRequest::Full;
    }
    if start >= file_size {
        return RangeRequest::Unsatisfiable;
    }

    let last = file_size - 1;
    RangeRequest::Partial {
        start,
        end: end.map_or(last, |e| e.min(last)),
    }
}
