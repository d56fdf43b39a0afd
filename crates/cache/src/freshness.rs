//! Decides whether a document's previous cache directory can be reused.
//!
//! Each document gets its own directory under the cache root, named after a
//! hash of its URL. The modification time the cache was built for is kept in
//! `modtime.txt`; when the document's current modification time differs, or
//! is unknown, everything in the directory is discarded before first use.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::disk::DiskStore;
use crate::error::CacheResult;

/// Name of the file recording the document modification time.
pub const MODTIME_FILE: &str = "modtime.txt";

const FILE_SCHEME: &str = "file://";

/// Directory holding the cache of `doc_url` under `cache_root`
pub fn cache_dir(cache_root: &Path, doc_url: &str) -> PathBuf {
    cache_root.join(hex::encode(Sha256::digest(doc_url.as_bytes())))
}

/// The modification time to trust for `doc_url`
///
/// For `file://` URLs the file's own modification time is used and
/// `supplied` is ignored. For anything else `supplied` is taken as is; `None`
/// means there is no reliable time and previous contents must not be reused.
pub fn resolve_modified_time(
    doc_url: &str,
    supplied: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match doc_url.strip_prefix(FILE_SCHEME) {
        Some(path) => fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .map_err(|e| tracing::warn!(doc_url, error = %e, "cannot read document modification time"))
            .ok(),
        None => supplied,
    }
}

/// Modification time recorded by a previous session, if readable
pub fn recorded_modified_time(store: &mut DiskStore) -> Option<DateTime<Utc>> {
    let data = store.read(MODTIME_FILE).ok()??;
    let text = std::str::from_utf8(&data).ok()?;
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

pub fn record_modified_time(store: &mut DiskStore, modified: DateTime<Utc>) -> CacheResult<()> {
    let text = modified.to_rfc3339_opts(SecondsFormat::Nanos, true);
    store.write(MODTIME_FILE, text.as_bytes())
}

/// Whether the contents of `store` were built for `modified`
pub fn is_reusable(store: &mut DiskStore, modified: Option<DateTime<Utc>>) -> bool {
    match (modified, recorded_modified_time(store)) {
        (Some(current), Some(recorded)) => current == recorded,
        _ => false,
    }
}

/// Open the durable store of a document, discarding stale contents
///
/// Returns `None` when the document must not be cached on disk at all
/// (`dont_cache`) or when the directory cannot be used; the cache then works
/// from memory only.
pub fn open_document_store(
    dir: &Path,
    modified: Option<DateTime<Utc>>,
    dont_cache: bool,
) -> Option<DiskStore> {
    if dont_cache {
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to discard cache directory");
            }
        }
        return None;
    }

    let mut store = match DiskStore::open(dir) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cache directory unusable, caching in memory only");
            return None;
        }
    };

    if is_reusable(&mut store, modified) {
        tracing::debug!(dir = %dir.display(), "reusing cached tiles");
        return Some(store);
    }

    tracing::debug!(dir = %dir.display(), "discarding stale cache contents");
    if let Err(e) = store.clear() {
        tracing::warn!(dir = %dir.display(), error = %e, "failed to discard stale cache contents");
        return None;
    }

    if let Some(modified) = modified {
        if let Err(e) = record_modified_time(&mut store, modified) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to record modification time");
        }
    }

    Some(store)
}
