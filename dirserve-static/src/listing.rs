//! JSON directory listings

use crate::error::ServeError;
use crate::mime::{EntryType, extension_of};
use crate::resolve::ResolvedPath;
use chrono::{DateTime, Local, SecondsFormat};
use dirserve_core::config::ListingOrder;
use serde::Serialize;
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// One child of a listed directory
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DirectoryEntry {
    pub name: String,
    pub extension: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub modified_timestamp: f64,
    pub modified_iso: String,
    pub path: String,
}

/// Listing response body
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    pub directory: String,
    pub total_items: usize,
    pub generated_at: String,
    pub files: Vec<DirectoryEntry>,
}

impl DirectoryListing {
    /// Serialize to the response body
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<Vec<u8>> {
        if pretty {
            serde_json::to_vec_pretty(self)
        } else {
            serde_json::to_vec(self)
        }
    }
}

/// Enumerate the immediate children of `dir`.
///
/// Children that cannot be stat'd are skipped; the rest of the listing is
/// still produced. Metadata is read fresh on every call.
pub async fn generate_listing(
    dir: &ResolvedPath,
    order: ListingOrder,
) -> Result<DirectoryListing, ServeError> {
    let mut read_dir = tokio::fs::read_dir(&dir.fs_path).await.map_err(|e| {
        tracing::warn!("📂 Cannot list {}: {}", dir.public_path, e);
        ServeError::NotFound(dir.fs_path.display().to_string())
    })?;

    let mut base = dir.public_path.clone();
    if !base.ends_with('/') {
        base.push('/');
    }

    let mut files = Vec::new();
    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("⚠️ Directory iteration stopped early in {}: {}", base, e);
                break;
            }
        };

        // A lossy name would advertise a path that never resolves
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                tracing::debug!("Skipping non-UTF-8 entry {:?} in {}", raw, base);
                continue;
            }
        };

        // Follows symlinks, so dangling links fail here and are dropped
        let metadata = match tokio::fs::metadata(entry.path()).await {
            Ok(m) => m,
            Err(source) => {
                tracing::debug!("{}", ServeError::ListingEntryUnreadable { name, source });
                continue;
            }
        };

        let entry_type = EntryType::from_metadata(&metadata);
        let modified = metadata.modified().ok();

        let (extension, size_bytes, path) = match entry_type {
            EntryType::Directory => (String::new(), None, format!("{}{}/", base, name)),
            EntryType::File => (
                extension_of(&name),
                Some(metadata.len()),
                format!("{}{}", base, name),
            ),
        };

        files.push(DirectoryEntry {
            extension,
            entry_type,
            size_bytes,
            modified_timestamp: modified.map(epoch_seconds).unwrap_or(0.0),
            modified_iso: modified.map(iso_local).unwrap_or_default(),
            path,
            name,
        });
    }

    sort_entries(&mut files, order);

    Ok(DirectoryListing {
        directory: base,
        total_items: files.len(),
        generated_at: iso_local(SystemTime::now()),
        files,
    })
}

/// Deterministic ordering for listings
pub(crate) fn sort_entries(entries: &mut [DirectoryEntry], order: ListingOrder) {
    match order {
        ListingOrder::Name => entries.sort_by(|a, b| {
            group_rank(a)
                .cmp(&group_rank(b))
                .then_with(|| compare_names(&a.name, &b.name))
        }),
        ListingOrder::Modified => entries.sort_by(|a, b| {
            b.modified_timestamp
                .total_cmp(&a.modified_timestamp)
                .then_with(|| compare_names(&a.name, &b.name))
        }),
    }
}

fn group_rank(entry: &DirectoryEntry) -> u8 {
    match entry.entry_type {
        EntryType::Directory => 0,
        EntryType::File => 1,
    }
}

// Plain byte order: uppercase sorts before lowercase
fn compare_names(a: &str, b: &str) -> Ordering {
    a.as_bytes().cmp(b.as_bytes())
}

fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

fn iso_local(time: SystemTime) -> String {
    DateTime::<Local>::from(time).to_rfc3339_opts(SecondsFormat::Micros, false)
}
