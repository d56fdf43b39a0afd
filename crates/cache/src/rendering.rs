//! Tracking of tiles sent to the backend for rendering
//!
//! At most one render is outstanding per [`TileDesc`]. Sessions that want a
//! tile while it is being rendered subscribe to the outstanding render
//! instead of issuing a second one, and are notified together when the
//! result arrives. A render whose last subscriber cancels is dropped and
//! reported back so the request can be abandoned upstream.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::tile::{Tile, TileDesc};

/// Opaque identity of a subscribing session
///
/// The session layer owns the mapping from ids to live sessions; the cache
/// only compares ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Outcome of subscribing to a tile render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// No render was outstanding; the caller must ask the backend for it.
    New { version: u32 },
    /// A render is already outstanding; the caller only waits.
    Pending { version: u32 },
}

impl Subscription {
    pub fn is_new(&self) -> bool {
        matches!(self, Subscription::New { .. })
    }

    pub fn version(&self) -> u32 {
        match *self {
            Subscription::New { version } | Subscription::Pending { version } => version,
        }
    }
}

/// One outstanding render request
#[derive(Debug, Clone)]
pub struct TileBeingRendered {
    tile: TileDesc,
    started: Instant,
    version: u32,
    subscribers: Vec<SubscriberId>,
}

impl TileBeingRendered {
    fn new(tile: TileDesc, version: u32) -> Self {
        Self {
            tile,
            started: Instant::now(),
            version,
            subscribers: Vec::new(),
        }
    }

    pub fn tile(&self) -> &TileDesc {
        &self.tile
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Subscribers in the order they subscribed
    pub fn subscribers(&self) -> &[SubscriberId] {
        &self.subscribers
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns false if `subscriber` was already subscribed.
    fn add_subscriber(&mut self, subscriber: SubscriberId) -> bool {
        if self.subscribers.contains(&subscriber) {
            return false;
        }
        self.subscribers.push(subscriber);
        true
    }

    fn remove_subscriber(&mut self, subscriber: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| *s != subscriber);
        self.subscribers.len() != before
    }
}

/// Renders abandoned because their last subscriber cancelled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelledTiles {
    tiles: Vec<(TileDesc, u32)>,
}

impl CancelledTiles {
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Abandoned descriptors
    pub fn tiles(&self) -> impl Iterator<Item = &TileDesc> {
        self.tiles.iter().map(|(tile, _)| tile)
    }

    /// Versions of the abandoned renders, as known to the backend
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.tiles.iter().map(|(_, version)| *version)
    }

    /// Backend command abandoning the renders, e.g. `canceltiles 3,7,`
    ///
    /// Empty when nothing was abandoned.
    pub fn to_message(&self) -> String {
        if self.tiles.is_empty() {
            return String::new();
        }
        let mut message = String::from("canceltiles ");
        for version in self.versions() {
            message.push_str(&version.to_string());
            message.push(',');
        }
        message
    }
}

/// Receives rendered tiles on behalf of subscribed sessions
pub trait TileNotifier {
    fn tile_rendered(&mut self, subscriber: SubscriberId, tile: &TileDesc, data: &Tile);
}

impl<F> TileNotifier for F
where
    F: FnMut(SubscriberId, &TileDesc, &Tile),
{
    fn tile_rendered(&mut self, subscriber: SubscriberId, tile: &TileDesc, data: &Tile) {
        self(subscriber, tile, data)
    }
}

/// Set of outstanding renders, one per descriptor
#[derive(Debug)]
pub struct RenderTracker {
    in_flight: BTreeMap<TileDesc, TileBeingRendered>,
    last_version: u32,
}

impl RenderTracker {
    pub fn new() -> Self {
        Self {
            in_flight: BTreeMap::new(),
            last_version: 0,
        }
    }

    /// Record that `tile` was sent to the backend
    ///
    /// Returns the version of the outstanding render, creating it only if
    /// there was none.
    pub fn register(&mut self, tile: &TileDesc) -> u32 {
        self.register_entry(tile).0.version
    }

    fn register_entry(&mut self, tile: &TileDesc) -> (&mut TileBeingRendered, bool) {
        match self.in_flight.entry(*tile) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                // Versions start at 1; 0 means "no render".
                self.last_version = self.last_version.wrapping_add(1).max(1);
                tracing::trace!(tile = %tile, version = self.last_version, "registering tile being rendered");
                (entry.insert(TileBeingRendered::new(*tile, self.last_version)), true)
            }
        }
    }

    /// Subscribe `subscriber` to the render of `tile`, starting one if needed
    pub fn subscribe(&mut self, tile: &TileDesc, subscriber: SubscriberId) -> Subscription {
        let (entry, created) = self.register_entry(tile);
        let version = entry.version;

        if !entry.add_subscriber(subscriber) {
            tracing::debug!(tile = %tile, %subscriber, "redundant subscription");
        } else {
            tracing::debug!(
                tile = %tile,
                %subscriber,
                subscribers = entry.subscribers.len(),
                "subscribed to tile rendering"
            );
        }

        if created {
            Subscription::New { version }
        } else {
            Subscription::Pending { version }
        }
    }

    /// Remove `subscriber` everywhere, dropping renders nobody waits for
    pub fn cancel(&mut self, subscriber: SubscriberId) -> CancelledTiles {
        let mut cancelled = CancelledTiles::default();

        self.in_flight.retain(|tile, entry| {
            if !entry.remove_subscriber(subscriber) || !entry.subscribers.is_empty() {
                return true;
            }
            tracing::trace!(tile = %tile, version = entry.version, "abandoning tile render");
            cancelled.tiles.push((*tile, entry.version));
            false
        });

        cancelled
    }

    /// Remove and return the outstanding render of `tile`, if any
    pub fn take(&mut self, tile: &TileDesc) -> Option<TileBeingRendered> {
        self.in_flight.remove(tile)
    }

    pub fn get(&self, tile: &TileDesc) -> Option<&TileBeingRendered> {
        self.in_flight.get(tile)
    }

    pub fn contains(&self, tile: &TileDesc) -> bool {
        self.in_flight.contains_key(tile)
    }

    /// Version of the outstanding render, or 0 if there is none
    pub fn version(&self, tile: &TileDesc) -> u32 {
        self.get(tile).map_or(0, TileBeingRendered::version)
    }

    /// Milliseconds since the render of `tile` was registered
    pub fn elapsed_ms(&self, tile: &TileDesc) -> Option<f64> {
        self.get(tile)
            .map(|entry| entry.elapsed().as_secs_f64() * 1000.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileBeingRendered> {
        self.in_flight.values()
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}

impl Default for RenderTracker {
    fn default() -> Self {
        Self::new()
    }
}
