//! Document Tile Cache Library
//!
//! Per-document cache of rendered tiles for a collaborative document server.
//! Tiles produced by an external rendering backend are kept in memory and on
//! disk, concurrent requests for the same tile share a single render, and
//! tiles are dropped when the backend reports the region they cover as
//! changed.
//!
//! # Example
//!
//! ```
//! use doc_tile_cache::{CacheConfig, SubscriberId, Tile, TileCache, TileDesc};
//!
//! let root = std::env::temp_dir().join("doc-tile-cache-doctest");
//! let config = CacheConfig::default().with_cache_root(&root);
//! let mut cache = TileCache::new(&config, "https://example.com/report.odt", None, false);
//!
//! let tile = TileDesc::new(0, 0, 0, 3840, 3840, 256, 256);
//! if cache.lookup_tile(&tile).is_none() {
//!     let subscription = cache.subscribe_to_tile_rendering(&tile, SubscriberId(1));
//!     assert!(subscription.is_new()); // ask the backend for the tile
//! }
//!
//! // Later, when the backend delivers the pixels:
//! let mut sent = Vec::new();
//! cache.save_tile_and_notify(&tile, b"png bytes", &mut |session: SubscriberId, _: &TileDesc, data: &Tile| {
//!     sent.push((session, data.len()));
//! });
//! assert_eq!(sent, vec![(SubscriberId(1), 9)]);
//!
//! // The backend reports a change in the top-left corner of part 0.
//! cache
//!     .invalidate_tiles("invalidatetiles: part=0 x=0 y=0 width=100 height=100")
//!     .unwrap();
//! assert!(cache.lookup_tile(&tile).is_none());
//! # std::fs::remove_dir_all(root).ok();
//! ```

pub mod cache;
pub mod config;
pub mod disk;
pub mod error;
pub mod freshness;
pub mod invalidate;
pub mod owner;
pub mod ram;
pub mod rendering;
pub mod tile;

pub use cache::TileCache;
pub use config::CacheConfig;
pub use disk::{DiskStats, DiskStore};
pub use error::{CacheError, CacheResult};
pub use invalidate::{parse_invalidate_msg, Invalidation};
pub use ram::{CacheStats, RamStore};
pub use rendering::{
    CancelledTiles, RenderTracker, SubscriberId, Subscription, TileBeingRendered, TileNotifier,
};
pub use tile::{Rect, Tile, TileDesc};
