//! Tile cache of one document
//!
//! [`TileCache`] is the object the document's session layer talks to. It
//! answers tile lookups from memory or disk, keeps at most one render per
//! tile outstanding while fanning the result out to every waiting session,
//! and drops tiles the backend reports as stale.
//!
//! Disk problems never fail an operation: the affected entry is served from
//! memory only and a warning is logged.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Write as _};
use std::thread::ThreadId;

use chrono::{DateTime, Utc};

use crate::config::CacheConfig;
use crate::disk::{DiskStats, DiskStore};
use crate::error::CacheResult;
use crate::freshness;
use crate::invalidate::{self, Invalidation};
use crate::owner::ThreadOwner;
use crate::ram::{CacheStats, RamStore};
use crate::rendering::{CancelledTiles, RenderTracker, SubscriberId, Subscription, TileNotifier};
use crate::tile::{Tile, TileDesc};

/// Handles the caching of tiles of one document
///
/// Not synchronized. One thread, the document's owner, is expected to make
/// every call; see [`TileCache::set_thread_owner`].
pub struct TileCache {
    doc_url: String,
    modified: Option<DateTime<Utc>>,
    dont_cache: bool,
    unsaved_changes: bool,
    owner: ThreadOwner,

    /// Tiles by cache file name and renderings by `<category>/<name>`
    memory: RamStore,
    text_files: HashMap<String, String>,
    /// `None` when nothing may be kept on disk for this document
    disk: Option<DiskStore>,
    rendering: RenderTracker,
}

impl TileCache {
    /// Open the cache of `doc_url`
    ///
    /// `modified` is the document's modification time as known to the
    /// caller. It is ignored for `file://` URLs, whose file is inspected
    /// instead; for other URLs `None` means the previous cache contents
    /// cannot be trusted. With `dont_cache` nothing is read from or written
    /// to disk and any previous directory is removed.
    pub fn new(
        config: &CacheConfig,
        doc_url: &str,
        modified: Option<DateTime<Utc>>,
        dont_cache: bool,
    ) -> Self {
        let modified = freshness::resolve_modified_time(doc_url, modified);
        let dir = freshness::cache_dir(&config.cache_root, doc_url);
        let disk = freshness::open_document_store(&dir, modified, dont_cache);

        tracing::debug!(
            doc_url,
            dir = %dir.display(),
            dont_cache,
            on_disk = disk.is_some(),
            "opened tile cache"
        );

        Self {
            doc_url: doc_url.to_string(),
            modified,
            dont_cache,
            unsaved_changes: false,
            owner: ThreadOwner::new(),
            memory: RamStore::new(config.memory_limit),
            text_files: HashMap::new(),
            disk,
            rendering: RenderTracker::new(),
        }
    }

    pub fn doc_url(&self) -> &str {
        &self.doc_url
    }

    /// Completely clear the cache contents
    ///
    /// Outstanding renders are kept so their subscribers are still notified.
    pub fn clear(&mut self) {
        self.assert_correct_thread();

        self.memory.clear();
        self.text_files.clear();

        if let Some(disk) = self.disk.as_mut() {
            if let Err(e) = disk.clear() {
                tracing::warn!(doc_url = %self.doc_url, error = %e, "failed to clear cache directory");
            }
            if let Some(modified) = self.modified {
                if let Err(e) = freshness::record_modified_time(disk, modified) {
                    tracing::warn!(doc_url = %self.doc_url, error = %e, "failed to record modification time");
                }
            }
        }

        tracing::info!(doc_url = %self.doc_url, "cleared tile cache");
    }

    /// Subscribe to the rendering of `tile`
    ///
    /// [`Subscription::New`] means no render was outstanding and the caller
    /// must send the request to the backend; otherwise it only waits.
    pub fn subscribe_to_tile_rendering(
        &mut self,
        tile: &TileDesc,
        subscriber: SubscriberId,
    ) -> Subscription {
        self.assert_correct_thread();
        self.rendering.subscribe(tile, subscriber)
    }

    /// Record that `tile` was sent to the backend without subscribing anyone
    ///
    /// [`TileCache::subscribe_to_tile_rendering`] does this itself.
    pub fn register_tile_being_rendered(&mut self, tile: &TileDesc) -> u32 {
        self.assert_correct_thread();
        self.rendering.register(tile)
    }

    /// Cancel every tile request made by `subscriber`
    ///
    /// Renders nobody else is waiting for are dropped and returned;
    /// [`CancelledTiles::to_message`] gives the backend command.
    pub fn cancel_tiles(&mut self, subscriber: SubscriberId) -> CancelledTiles {
        self.assert_correct_thread();

        let cancelled = self.rendering.cancel(subscriber);
        tracing::trace!(%subscriber, abandoned = cancelled.len(), "cancelled tiles");
        cancelled
    }

    /// Find the tile with this description
    pub fn lookup_tile(&mut self, tile: &TileDesc) -> Option<Tile> {
        self.assert_correct_thread();
        self.load(&tile.cache_file_name())
    }

    /// Store a rendered tile and hand it to everyone waiting for it
    ///
    /// Returns the number of subscribers notified. The outstanding render,
    /// if any, is finished by this call.
    pub fn save_tile_and_notify<N>(&mut self, tile: &TileDesc, data: &[u8], notifier: &mut N) -> usize
    where
        N: TileNotifier + ?Sized,
    {
        self.assert_correct_thread();

        let stored = self.save(&tile.cache_file_name(), data);

        let Some(rendered) = self.rendering.take(tile) else {
            tracing::debug!(tile = %tile, "no subscribers for rendered tile");
            return 0;
        };

        for subscriber in rendered.subscribers() {
            notifier.tile_rendered(*subscriber, tile, &stored);
        }

        tracing::debug!(
            tile = %tile,
            version = rendered.version(),
            subscribers = rendered.subscribers().len(),
            elapsed_ms = rendered.elapsed().as_millis() as u64,
            "tile rendered"
        );
        rendered.subscribers().len()
    }

    /// Content of a text file saved with [`TileCache::save_text_file`]
    pub fn get_text_file(&mut self, file_name: &str) -> Option<String> {
        self.assert_correct_thread();

        if let Some(text) = self.text_files.get(file_name) {
            return Some(text.clone());
        }

        let data = self.read_disk(file_name)?;
        match String::from_utf8(data.to_vec()) {
            Ok(text) => {
                self.text_files.insert(file_name.to_string(), text.clone());
                Some(text)
            }
            Err(e) => {
                tracing::warn!(file_name, error = %e, "cached text file is not UTF-8");
                None
            }
        }
    }

    /// Save some text into a file in the cache directory
    pub fn save_text_file(&mut self, text: &str, file_name: &str) {
        self.assert_correct_thread();

        self.write_disk(file_name, text.as_bytes());
        self.text_files.insert(file_name.to_string(), text.to_string());
    }

    /// Set the unsaved-changes state
    ///
    /// Only reported in diagnostics; caching decisions never depend on it.
    pub fn set_unsaved_changes(&mut self, state: bool) {
        self.assert_correct_thread();

        if state != self.unsaved_changes {
            tracing::debug!(doc_url = %self.doc_url, unsaved_changes = state, "unsaved changes");
        }
        self.unsaved_changes = state;
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes
    }

    /// Save a font, style or similar rendering
    ///
    /// `category` is the kind of rendering, like `"font"` or `"style"`.
    pub fn save_rendering(&mut self, name: &str, category: &str, data: &[u8]) {
        self.assert_correct_thread();
        self.save(&rendering_key(name, category), data);
    }

    /// Return a rendering saved with [`TileCache::save_rendering`], if we have it
    pub fn lookup_cached_tile(&mut self, name: &str, category: &str) -> Option<Tile> {
        self.assert_correct_thread();
        self.load(&rendering_key(name, category))
    }

    /// Drop the tiles covered by an `invalidatetiles:` message from the backend
    ///
    /// Returns the number of tiles removed. A message that cannot be decoded
    /// removes nothing and is returned as an error.
    pub fn invalidate_tiles(&mut self, message: &str) -> CacheResult<usize> {
        self.assert_correct_thread();

        let invalidation = Self::parse_invalidate_msg(message).map_err(|e| {
            tracing::error!(error = %e, "cannot invalidate tiles");
            e
        })?;
        Ok(self.invalidate_area(&invalidation))
    }

    /// Decode an `invalidatetiles:` message into a part and a rectangle
    pub fn parse_invalidate_msg(message: &str) -> CacheResult<Invalidation> {
        invalidate::parse_invalidate_msg(message)
    }

    /// Drop every cached tile of the selected part(s) overlapping the area
    pub fn invalidate_area(&mut self, invalidation: &Invalidation) -> usize {
        self.assert_correct_thread();

        let mut names: BTreeSet<String> = self.memory.keys().map(str::to_string).collect();
        if let Some(disk) = self.disk.as_ref() {
            match disk.list_root_files() {
                Ok(files) => names.extend(files),
                Err(e) => tracing::warn!(error = %e, "cannot scan cache directory for invalidation"),
            }
        }

        let mut evicted = 0;
        for name in names {
            let Ok(tile) = TileDesc::parse_cache_file_name(&name) else {
                continue;
            };
            if invalidation.covers(&tile) {
                tracing::trace!(tile = %tile, "removing invalidated tile");
                self.remove_file(&name);
                evicted += 1;
            }
        }

        tracing::debug!(
            part = ?invalidation.part,
            rect = ?invalidation.rect,
            evicted,
            "invalidated tiles"
        );
        evicted
    }

    /// Drop the outstanding render of `tile` without notifying anyone
    pub fn forget_tile_being_rendered(&mut self, tile: &TileDesc) {
        self.assert_correct_thread();

        if let Some(rendered) = self.rendering.take(tile) {
            tracing::trace!(tile = %tile, version = rendered.version(), "forgetting tile being rendered");
        }
    }

    /// Milliseconds since the render of `tile` was registered
    pub fn tile_being_rendered_elapsed_ms(&self, tile: &TileDesc) -> Option<f64> {
        self.rendering.elapsed_ms(tile)
    }

    pub fn has_tile_being_rendered(&self, tile: &TileDesc) -> bool {
        self.rendering.contains(tile)
    }

    /// Version of the outstanding render of `tile`, or 0 if there is none
    pub fn tile_being_rendered_version(&self, tile: &TileDesc) -> u32 {
        self.rendering.version(tile)
    }

    pub fn memory_stats(&self) -> CacheStats {
        self.memory.stats()
    }

    /// `None` when the cache does not use the disk
    pub fn disk_stats(&self) -> Option<DiskStats> {
        self.disk.as_ref().map(DiskStore::stats)
    }

    /// Write a human-readable description of the cache state
    pub fn dump_state<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let stats = self.memory.stats();

        writeln!(out, "  TileCache for {}:", self.doc_url)?;
        match self.modified {
            Some(modified) => writeln!(out, "    modified: {}", modified.to_rfc3339())?,
            None => writeln!(out, "    modified: unknown")?,
        }
        writeln!(out, "    dont cache: {}", self.dont_cache)?;
        writeln!(out, "    unsaved changes: {}", self.unsaved_changes)?;
        writeln!(out, "    owner: {:?}", self.owner.get())?;
        writeln!(
            out,
            "    memory: {} entries, {} / {} bytes, {} hits, {} misses, {} evictions",
            stats.entry_count,
            stats.memory_used,
            stats.memory_limit,
            stats.hits,
            stats.misses,
            stats.evictions
        )?;
        writeln!(out, "    text files: {}", self.text_files.len())?;
        match &self.disk {
            Some(disk) => {
                let disk_stats = disk.stats();
                writeln!(
                    out,
                    "    disk: {} ({} reads, {} writes, {} removals, {} failures)",
                    disk.root().display(),
                    disk_stats.reads,
                    disk_stats.writes,
                    disk_stats.removals,
                    disk_stats.failures
                )?;
            }
            None => writeln!(out, "    disk: none")?,
        }

        writeln!(out, "    tiles being rendered: {}", self.rendering.len())?;
        for rendered in self.rendering.iter() {
            let mut subscribers = String::new();
            for subscriber in rendered.subscribers() {
                write!(subscribers, " {subscriber}")?;
            }
            writeln!(
                out,
                "      {} version {} elapsed {}ms subscribers:{}",
                rendered.tile().cache_file_name(),
                rendered.version(),
                rendered.elapsed().as_millis(),
                subscribers
            )?;
        }
        Ok(())
    }

    /// Make the current-thread check in every operation use `id` as the owner
    pub fn set_thread_owner(&mut self, id: ThreadId) {
        self.owner.set(id);
    }

    /// Panics in debug builds when called off the owning thread
    #[track_caller]
    pub fn assert_correct_thread(&self) {
        self.owner.assert_current();
    }

    /// Memory first, then disk; a disk hit is kept in memory.
    fn load(&mut self, key: &str) -> Option<Tile> {
        if let Some(tile) = self.memory.get(key) {
            return Some(tile);
        }

        let tile = self.read_disk(key)?;
        self.memory.put(key, tile.clone());
        Some(tile)
    }

    /// Entries that did not reach the disk are pinned in memory.
    fn save(&mut self, key: &str, data: &[u8]) -> Tile {
        let tile: Tile = data.into();
        if self.write_disk(key, data) {
            self.memory.put(key, tile.clone());
        } else {
            self.memory.put_pinned(key, tile.clone());
        }
        tile
    }

    /// Removes the given file from memory and disk
    fn remove_file(&mut self, key: &str) {
        self.memory.remove(key);
        self.text_files.remove(key);

        if let Some(disk) = self.disk.as_mut() {
            if let Err(e) = disk.remove(key) {
                tracing::warn!(file = key, error = %e, "failed to remove cache file");
            }
        }
    }

    fn read_disk(&mut self, key: &str) -> Option<Tile> {
        let disk = self.disk.as_mut()?;
        match disk.read(key) {
            Ok(tile) => tile,
            Err(e) => {
                tracing::warn!(file = key, error = %e, "failed to read cache file");
                None
            }
        }
    }

    /// Whether `data` now has a durable copy
    fn write_disk(&mut self, key: &str, data: &[u8]) -> bool {
        let Some(disk) = self.disk.as_mut() else {
            return false;
        };
        match disk.write(key, data) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(file = key, error = %e, "failed to write cache file, keeping it in memory only");
                false
            }
        }
    }
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("doc_url", &self.doc_url)
            .field("dont_cache", &self.dont_cache)
            .field("entries", &self.memory.len())
            .field("tiles_being_rendered", &self.rendering.len())
            .finish()
    }
}

fn rendering_key(name: &str, category: &str) -> String {
    format!("{category}/{name}")
}
