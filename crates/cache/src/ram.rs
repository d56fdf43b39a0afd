//! In-memory store with LRU eviction
//!
//! Holds the memory copy of every tile and rendering the document has seen,
//! keyed by the same relative path used on disk. When the byte limit is
//! reached the least recently used entries are dropped and the durable copy
//! keeps serving them. Entries without a durable copy are pinned: they are
//! never evicted and only leave through `remove` or `clear`.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::tile::Tile;

/// Statistics about in-memory store usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently held
    pub entry_count: usize,

    /// Total bytes held by the entries
    pub memory_used: usize,

    /// Maximum bytes allowed
    pub memory_limit: usize,

    /// Number of lookups answered from memory
    pub hits: u64,

    /// Number of lookups that found nothing
    pub misses: u64,

    /// Number of entries dropped due to memory pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_limit as f64
        }
    }
}

/// Byte-bounded map from cache key to shared tile bytes
///
/// Not synchronized; the owning [`crate::TileCache`] is single-threaded.
pub struct RamStore {
    /// Map from key to tile data
    entries: HashMap<String, Tile>,

    /// LRU queue (most recently used at back, least recently used at front)
    ///
    /// Pinned keys are never queued.
    lru_queue: VecDeque<String>,

    /// Keys that must stay in memory
    pinned: HashSet<String>,

    stats: CacheStats,
}

impl RamStore {
    /// Create a store that holds at most `memory_limit` bytes
    pub fn new(memory_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            pinned: HashSet::new(),
            stats: CacheStats {
                memory_limit,
                ..Default::default()
            },
        }
    }

    /// Move a key to the back of the LRU queue (mark as most recently used)
    fn touch(&mut self, key: &str) {
        if self.pinned.contains(key) {
            return;
        }
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }

    fn evict_lru(&mut self) -> Option<Tile> {
        let key = self.lru_queue.pop_front()?;
        let tile = self.entries.remove(&key)?;
        self.stats.memory_used = self.stats.memory_used.saturating_sub(tile.len());
        self.stats.entry_count = self.entries.len();
        self.stats.evictions += 1;
        Some(tile)
    }

    fn evict_to_fit(&mut self, required_size: usize) {
        while self.stats.memory_used + required_size > self.stats.memory_limit
            && !self.entries.is_empty()
        {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    /// Store a tile, replacing any previous entry under `key`
    ///
    /// A tile larger than the whole limit is still kept, alone, so that the
    /// value just stored is always visible to the next lookup.
    pub fn put(&mut self, key: &str, tile: Tile) {
        self.insert(key, tile, false);
    }

    /// Store a tile that has no other copy
    ///
    /// It counts towards the memory used but is never evicted, so the
    /// limit can be exceeded by pinned entries.
    pub fn put_pinned(&mut self, key: &str, tile: Tile) {
        self.insert(key, tile, true);
    }

    fn insert(&mut self, key: &str, tile: Tile, pinned: bool) {
        self.remove(key);
        self.evict_to_fit(tile.len());

        if pinned {
            self.pinned.insert(key.to_string());
        }
        self.stats.memory_used += tile.len();
        self.entries.insert(key.to_string(), tile);
        self.touch(key);
        self.stats.entry_count = self.entries.len();
    }

    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned.contains(key)
    }

    /// Retrieve a tile, updating LRU order and hit/miss counters
    pub fn get(&mut self, key: &str) -> Option<Tile> {
        match self.entries.get(key).cloned() {
            Some(tile) => {
                self.touch(key);
                self.stats.hits += 1;
                Some(tile)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Check for a key without touching LRU order or counters
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove an entry; `None` if it was not present
    pub fn remove(&mut self, key: &str) -> Option<Tile> {
        let tile = self.entries.remove(key)?;
        self.stats.memory_used = self.stats.memory_used.saturating_sub(tile.len());
        if !self.pinned.remove(key) {
            self.lru_queue.retain(|k| k != key);
        }
        self.stats.entry_count = self.entries.len();
        Some(tile)
    }

    /// Keys currently held, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_queue.clear();
        self.pinned.clear();
        self.stats.memory_used = 0;
        self.stats.entry_count = 0;
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(fill: u8, len: usize) -> Tile {
        vec![fill; len].into()
    }

    #[test]
    fn test_basic_put_get() {
        let mut store = RamStore::new(1024 * 1024);

        let data = tile(7, 256 * 256);
        store.put("a", data.clone());

        let fetched = store.get("a").expect("Tile should be in memory");
        assert_eq!(fetched, data);
    }

    #[test]
    fn test_miss_counts() {
        let mut store = RamStore::new(1024);

        assert!(store.get("missing").is_none());

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_lru_eviction() {
        let mut store = RamStore::new(512);

        store.put("1", tile(1, 256));
        store.put("2", tile(2, 256));
        store.put("3", tile(3, 256)); // Should evict "1"

        assert!(!store.contains("1"));
        assert!(store.contains("2"));
        assert!(store.contains("3"));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_lru_ordering() {
        let mut store = RamStore::new(512);

        store.put("1", tile(1, 256));
        store.put("2", tile(2, 256));

        // Access "1" to make it more recently used
        assert!(store.get("1").is_some());

        store.put("3", tile(3, 256));

        assert!(store.contains("1"));
        assert!(!store.contains("2"));
        assert!(store.contains("3"));
    }

    #[test]
    fn test_oversized_tile_is_still_kept() {
        let mut store = RamStore::new(100);

        store.put("small", tile(1, 50));
        store.put("big", tile(2, 500));

        assert!(!store.contains("small"));
        assert!(store.contains("big"));
    }

    #[test]
    fn test_pinned_entries_are_never_evicted() {
        let mut store = RamStore::new(512);

        store.put_pinned("a", tile(1, 300));
        store.put_pinned("b", tile(2, 300));
        store.put("c", tile(3, 100));
        store.put("d", tile(4, 100));

        assert!(store.contains("a"));
        assert!(store.contains("b"));
        assert!(!store.contains("c"));
        assert!(store.contains("d"));
        assert_eq!(store.stats().memory_used, 700);
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_repinning_and_unpinning() {
        let mut store = RamStore::new(256);

        store.put_pinned("a", tile(1, 200));
        assert!(store.is_pinned("a"));

        store.put("a", tile(2, 200));
        assert!(!store.is_pinned("a"));
        store.put("b", tile(3, 200));
        assert!(!store.contains("a"));

        store.put_pinned("b", tile(4, 200));
        assert!(store.remove("b").is_some());
        assert!(!store.is_pinned("b"));
        assert_eq!(store.stats().memory_used, 0);
    }

    #[test]
    fn test_replace_existing_entry() {
        let mut store = RamStore::new(1024);

        store.put("a", tile(1, 100));
        store.put("a", tile(2, 300));

        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().memory_used, 300);
        assert_eq!(store.get("a").unwrap()[0], 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = RamStore::new(1024);

        store.put("a", tile(1, 100));
        store.put("b", tile(1, 100));

        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert_eq!(store.stats().memory_used, 100);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.stats().memory_used, 0);
    }

    #[test]
    fn test_hit_rate() {
        let mut store = RamStore::new(1024);
        store.put("a", tile(0, 10));

        let _ = store.get("a");
        let _ = store.get("b");

        assert_eq!(store.stats().hit_rate(), 0.5);
    }
}
