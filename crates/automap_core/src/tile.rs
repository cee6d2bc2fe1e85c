//! Tile identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a tile within the map's tilesets.
///
/// `0` is reserved for "no tile", matching the global tile id convention used
/// by most tile-map formats. Everything else is opaque to the engine: two
/// cells hold the same tile exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(pub u32);

impl TileId {
    /// The empty cell.
    pub const EMPTY: TileId = TileId(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for TileId {
    fn from(raw: u32) -> Self {
        TileId(raw)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<empty>")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert!(TileId::default().is_empty());
        assert!(!TileId::new(7).is_empty());
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&TileId(12)).unwrap();
        assert_eq!(json, "12");
        let parsed: TileId = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, TileId(3));
    }
}
