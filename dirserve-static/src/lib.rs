//! Dirserve Static Content Module
//!
//! Read-only access to a content root:
//! - Path resolution confined to the root
//! - MIME type classification
//! - JSON directory listings
//! - Chunked file streaming with range support

mod error;
mod file_server;
mod listing;
mod mime;
mod resolve;

pub use error::ServeError;
pub use file_server::{FileServer, FileServerConfig, FileTransfer, RangeRequest, parse_range};
pub use listing::{DirectoryEntry, DirectoryListing, generate_listing};
pub use mime::{EntryType, content_disposition, content_type_for, extension_of};
pub use resolve::{ContentRoot, ResolvedPath};
