//! `invalidatetiles:` messages from the rendering backend
//!
//! The backend reports stale document regions in one of three shapes:
//!
//! ```text
//! invalidatetiles: part=<p> x=<x> y=<y> width=<w> height=<h>
//! invalidatetiles: EMPTY          whole document, every part
//! invalidatetiles: EMPTY, <p>     whole part <p>
//! ```
//!
//! Tokens are separated by any amount of whitespace. Decoding never panics;
//! anything that does not match one of the shapes exactly is reported as
//! [`CacheError::InvalidMessage`].

use crate::error::{CacheError, CacheResult};
use crate::tile::{Rect, TileDesc};

const PREFIX: &str = "invalidatetiles:";
const EMPTY: &str = "EMPTY";

/// Part value the backend uses on the wire to mean "every part".
const ALL_PARTS: i32 = -1;

/// A decoded invalidation: which part(s) and which document area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    /// `None` selects every part of the document
    pub part: Option<i32>,
    pub rect: Rect,
}

impl Invalidation {
    /// `part` of -1 selects every part, as it does on the wire.
    pub fn area(part: i32, rect: Rect) -> Self {
        Self {
            part: (part != ALL_PARTS).then_some(part),
            rect,
        }
    }

    pub fn whole_part(part: i32) -> Self {
        Self::area(part, Rect::everything())
    }

    pub fn whole_document() -> Self {
        Self {
            part: None,
            rect: Rect::everything(),
        }
    }

    /// The single part selected, treating a raw `Some(-1)` as every part
    fn selected_part(&self) -> Option<i32> {
        self.part.filter(|&part| part != ALL_PARTS)
    }

    /// Whether a cached tile falls under this invalidation
    pub fn covers(&self, tile: &TileDesc) -> bool {
        if self.selected_part().is_some_and(|part| part != tile.part) {
            return false;
        }
        tile.rect().intersects(&self.rect)
    }

    /// Encode in the backend's wire format; inverse of [`parse_invalidate_msg`].
    ///
    /// `Some(-1)` is written as every part, which is how it decodes.
    pub fn to_message(&self) -> String {
        match (self.selected_part(), self.rect == Rect::everything()) {
            (None, true) => format!("{PREFIX} {EMPTY}"),
            (Some(part), true) => format!("{PREFIX} {EMPTY}, {part}"),
            (part, false) => format!(
                "{PREFIX} part={} x={} y={} width={} height={}",
                part.unwrap_or(ALL_PARTS),
                self.rect.x,
                self.rect.y,
                self.rect.width,
                self.rect.height
            ),
        }
    }
}

/// Decode an `invalidatetiles:` message into the part and area it invalidates
pub fn parse_invalidate_msg(message: &str) -> CacheResult<Invalidation> {
    parse_tokens(message).ok_or_else(|| CacheError::InvalidMessage(message.to_string()))
}

fn parse_tokens(message: &str) -> Option<Invalidation> {
    let tokens: Vec<&str> = message.split_whitespace().collect();
    if tokens.first() != Some(&PREFIX) {
        return None;
    }

    match tokens[1..] {
        [EMPTY] => Some(Invalidation::whole_document()),
        ["EMPTY,", part] => Some(Invalidation::whole_part(part.parse().ok()?)),
        [part, x, y, width, height] => {
            let part = keyed_int(part, "part")?;
            let rect = Rect::new(
                keyed_int(x, "x")?,
                keyed_int(y, "y")?,
                keyed_int(width, "width")?,
                keyed_int(height, "height")?,
            );
            Some(Invalidation::area(part, rect))
        }
        _ => None,
    }
}

/// Value of a `key=<int>` token, if the key matches.
fn keyed_int(token: &str, key: &str) -> Option<i32> {
    let (name, value) = token.split_once('=')?;
    if name != key {
        return None;
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_area() {
        let inv = parse_invalidate_msg("invalidatetiles: part=0 x=0 y=0 width=100 height=100").unwrap();
        assert_eq!(inv, Invalidation::area(0, Rect::new(0, 0, 100, 100)));
    }

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        let inv =
            parse_invalidate_msg("  invalidatetiles:   part=3  x=-5 y=10\twidth=7 height=8\n").unwrap();
        assert_eq!(inv, Invalidation::area(3, Rect::new(-5, 10, 7, 8)));
    }

    #[test]
    fn test_parse_whole_document() {
        let inv = parse_invalidate_msg("invalidatetiles: EMPTY").unwrap();
        assert_eq!(inv.part, None);
        assert_eq!(inv.rect, Rect::everything());
    }

    #[test]
    fn test_parse_whole_part() {
        let inv = parse_invalidate_msg("invalidatetiles: EMPTY, 4").unwrap();
        assert_eq!(inv, Invalidation::whole_part(4));
    }

    #[test]
    fn test_parse_all_parts_area() {
        let inv = parse_invalidate_msg("invalidatetiles: part=-1 x=1 y=2 width=3 height=4").unwrap();
        assert_eq!(inv.part, None);
        assert_eq!(inv.rect, Rect::new(1, 2, 3, 4));
    }

    #[test]
    fn test_parse_whole_part_minus_one_is_whole_document() {
        let inv = parse_invalidate_msg("invalidatetiles: EMPTY, -1").unwrap();
        assert_eq!(inv, Invalidation::whole_document());
        assert!(inv.covers(&TileDesc::new(3, 0, 0, 256, 256, 256, 256)));
    }

    #[test]
    fn test_all_parts_sentinel_encodes_losslessly() {
        let rect = Rect::new(0, 0, 10, 10);
        let raw = Invalidation {
            part: Some(-1),
            rect,
        };

        assert_eq!(Invalidation::area(-1, rect).part, None);
        assert_eq!(parse_invalidate_msg(&raw.to_message()).unwrap(), Invalidation::area(-1, rect));
        assert_eq!(Invalidation::whole_part(-1).to_message(), "invalidatetiles: EMPTY");
        assert!(raw.covers(&TileDesc::new(5, 0, 0, 256, 256, 256, 256)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for message in [
            "",
            "invalidatetiles:",
            "invalidatetile: EMPTY",
            "tile: part=0 x=0 y=0 width=1 height=1",
            "invalidatetiles: EMPTY,",
            "invalidatetiles: EMPTY, x",
            "invalidatetiles: EMPTY 4",
            "invalidatetiles: part=0 x=0 y=0 width=1",
            "invalidatetiles: part=0 x=0 y=0 width=1 height=1 extra=2",
            "invalidatetiles: x=0 part=0 y=0 width=1 height=1",
            "invalidatetiles: part=0 x=0 y=0 width=1 height=",
            "invalidatetiles: part=0 x=0 y=0 width=1 height=1.5",
            "invalidatetiles: part=zero x=0 y=0 width=1 height=1",
            "invalidatetiles: part=0 x=0 y=0 width=99999999999 height=1",
        ] {
            assert!(
                matches!(parse_invalidate_msg(message), Err(CacheError::InvalidMessage(_))),
                "{message:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_backend_fixtures_round_trip() {
        for message in [
            "invalidatetiles: part=0 x=0 y=0 width=100 height=100",
            "invalidatetiles: part=2 x=-256 y=3840 width=11520 height=768",
            "invalidatetiles: part=-1 x=0 y=0 width=1 height=1",
            "invalidatetiles: EMPTY",
            "invalidatetiles: EMPTY, 7",
        ] {
            let inv = parse_invalidate_msg(message).unwrap();
            assert_eq!(inv.to_message(), message);
            assert_eq!(parse_invalidate_msg(&inv.to_message()).unwrap(), inv);
        }
    }

    #[test]
    fn test_covers() {
        let tile = TileDesc::new(0, 0, 0, 256, 256, 256, 256);
        let other_part = TileDesc::new(1, 0, 0, 256, 256, 256, 256);

        let inv = Invalidation::area(0, Rect::new(0, 0, 100, 100));
        assert!(inv.covers(&tile));
        assert!(!inv.covers(&other_part));

        let touching = Invalidation::area(0, Rect::new(256, 0, 100, 100));
        assert!(!touching.covers(&tile));

        let everything = Invalidation::whole_document();
        assert!(everything.covers(&tile));
        assert!(everything.covers(&other_part));
    }
}
