//! Tile identity and the durable file-name codec
//!
//! A tile is addressed by the document part it belongs to, the rectangle it
//! covers in document coordinates and the pixel size it was rendered at.
//! The cache stores every tile under a file name derived from those seven
//! integers, and recovers the descriptor from the name when scanning for
//! invalidation, so the encoding below must stay stable across releases.

use std::fmt;
use std::sync::Arc;

use crate::error::{CacheError, CacheResult};

/// Rendered tile bytes, shared read-only between the cache and its callers.
pub type Tile = Arc<[u8]>;

/// Extension used for tile files on disk.
const TILE_EXTENSION: &str = ".png";

/// Axis-aligned rectangle in document coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering the whole addressable document area.
    pub fn everything() -> Self {
        Self::new(0, 0, i32::MAX, i32::MAX)
    }

    /// Whether the two rectangles share an area larger than zero.
    ///
    /// Rectangles that only touch along an edge or a corner do not intersect.
    /// Computed in `i64` so that `everything()` cannot overflow.
    pub fn intersects(&self, other: &Rect) -> bool {
        let left = i64::from(self.x).max(i64::from(other.x));
        let right = (i64::from(self.x) + i64::from(self.width))
            .min(i64::from(other.x) + i64::from(other.width));
        let top = i64::from(self.y).max(i64::from(other.y));
        let bottom = (i64::from(self.y) + i64::from(self.height))
            .min(i64::from(other.y) + i64::from(other.height));

        left < right && top < bottom
    }
}

/// Identity of one renderable tile
///
/// Two descriptors name the same tile iff all seven integers match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileDesc {
    /// Part (page, sheet or slide) index
    pub part: i32,

    /// Left edge in document coordinates
    pub x: i32,

    /// Top edge in document coordinates
    pub y: i32,

    /// Width in document coordinates
    pub width: i32,

    /// Height in document coordinates
    pub height: i32,

    /// Rendered width in pixels
    pub tile_width: i32,

    /// Rendered height in pixels
    pub tile_height: i32,
}

impl TileDesc {
    pub fn new(
        part: i32,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        tile_width: i32,
        tile_height: i32,
    ) -> Self {
        Self {
            part,
            x,
            y,
            width,
            height,
            tile_width,
            tile_height,
        }
    }

    /// Document area covered by this tile
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Canonical cache file name, `{part}_{tile_width}x{tile_height}.{x},{y}.{width}x{height}.png`.
    pub fn cache_file_name(&self) -> String {
        format!(
            "{}_{}x{}.{},{}.{}x{}{}",
            self.part,
            self.tile_width,
            self.tile_height,
            self.x,
            self.y,
            self.width,
            self.height,
            TILE_EXTENSION
        )
    }

    /// Inverse of [`TileDesc::cache_file_name`].
    ///
    /// Only the exact canonical shape is accepted; any other name (including
    /// the auxiliary files kept next to the tiles) is rejected with
    /// [`CacheError::InvalidFileName`].
    pub fn parse_cache_file_name(file_name: &str) -> CacheResult<Self> {
        Self::parse_fields(file_name).ok_or_else(|| CacheError::InvalidFileName(file_name.to_string()))
    }

    fn parse_fields(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(TILE_EXTENSION)?;

        let mut sections = stem.split('.');
        let (head, position, size) = (sections.next()?, sections.next()?, sections.next()?);
        if sections.next().is_some() {
            return None;
        }

        let (part, pixels) = head.split_once('_')?;
        let (tile_width, tile_height) = pixels.split_once('x')?;
        let (x, y) = position.split_once(',')?;
        let (width, height) = size.split_once('x')?;

        Some(Self {
            part: parse_int(part)?,
            x: parse_int(x)?,
            y: parse_int(y)?,
            width: parse_int(width)?,
            height: parse_int(height)?,
            tile_width: parse_int(tile_width)?,
            tile_height: parse_int(tile_height)?,
        })
    }
}

impl fmt::Display for TileDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.part, self.x, self.y)
    }
}

/// Decimal integer with an optional leading minus and nothing else.
fn parse_int(token: &str) -> Option<i32> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cache_file_name_layout() {
        let tile = TileDesc::new(2, 3840, 7680, 3840, 3840, 256, 256);
        assert_eq!(tile.cache_file_name(), "2_256x256.3840,7680.3840x3840.png");
    }

    #[test]
    fn test_parse_cache_file_name() {
        let tile = TileDesc::parse_cache_file_name("0_512x256.-10,20.3000x1500.png").unwrap();
        assert_eq!(tile, TileDesc::new(0, -10, 20, 3000, 1500, 512, 256));
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        for name in [
            "",
            "modtime.txt",
            "0_256x256.0,0.256x256",
            "0_256x256.0,0.256x256.jpg",
            "0_256x256.0,0.256x256.png.bak",
            "0_256x256.0.256x256.png",
            "0_256x256.0,0,0.256x256.png",
            "0_256.0,0.256x256.png",
            "a_256x256.0,0.256x256.png",
            "0_256x256.+1,0.256x256.png",
            "0_256x256. 1,0.256x256.png",
            "0_256x256.0,0.256x256x1.png",
            "0_256x256.0,0.99999999999x256.png",
        ] {
            let result = TileDesc::parse_cache_file_name(name);
            assert!(
                matches!(result, Err(CacheError::InvalidFileName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_intersects_overlap() {
        let tile = Rect::new(0, 0, 256, 256);
        assert!(tile.intersects(&Rect::new(0, 0, 100, 100)));
        assert!(tile.intersects(&Rect::new(255, 255, 10, 10)));
        assert!(tile.intersects(&Rect::new(-50, -50, 51, 51)));
        assert!(tile.intersects(&Rect::everything()));
    }

    #[test]
    fn test_intersects_touching_edges_do_not_count() {
        let tile = Rect::new(0, 0, 256, 256);
        assert!(!tile.intersects(&Rect::new(256, 0, 100, 100)));
        assert!(!tile.intersects(&Rect::new(0, 256, 100, 100)));
        assert!(!tile.intersects(&Rect::new(-100, -100, 100, 100)));
        assert!(!tile.intersects(&Rect::new(10, 10, 0, 50)));
    }

    #[test]
    fn test_display_is_short_label() {
        let tile = TileDesc::new(1, 256, 512, 256, 256, 256, 256);
        assert_eq!(tile.to_string(), "(1,256,512)");
    }

    proptest! {
        #[test]
        fn cache_file_name_round_trips(
            part in any::<i32>(),
            x in any::<i32>(),
            y in any::<i32>(),
            width in any::<i32>(),
            height in any::<i32>(),
            tile_width in any::<i32>(),
            tile_height in any::<i32>(),
        ) {
            let tile = TileDesc::new(part, x, y, width, height, tile_width, tile_height);
            let parsed = TileDesc::parse_cache_file_name(&tile.cache_file_name()).unwrap();
            prop_assert_eq!(parsed, tile);
        }

        #[test]
        fn intersection_is_symmetric(
            ax in -1000i32..1000, ay in -1000i32..1000, aw in 0i32..500, ah in 0i32..500,
            bx in -1000i32..1000, by in -1000i32..1000, bw in 0i32..500, bh in 0i32..500,
        ) {
            let a = Rect::new(ax, ay, aw, ah);
            let b = Rect::new(bx, by, bw, bh);
            prop_assert_eq!(a.intersects(&b), b.intersects(&a));
        }
    }
}
