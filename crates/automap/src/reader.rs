//! Reading rule maps from disk.

use std::path::Path;

use automap_core::TileMap;

use crate::{AutomapError, AutomapResult};

/// Parses a rule file into a [`TileMap`].
///
/// The manager only talks to this trait, so a host can plug in its own map
/// format.
pub trait MapReader {
    fn read_map(&self, path: &Path) -> AutomapResult<TileMap>;
}

/// Reads maps stored as serde JSON (`*.map.json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMapReader;

impl MapReader for JsonMapReader {
    fn read_map(&self, path: &Path) -> AutomapResult<TileMap> {
        let content = std::fs::read_to_string(path).map_err(|source| AutomapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        load_map_from_str(&content).map_err(|source| AutomapError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Load a map from a JSON string.
pub fn load_map_from_str(json: &str) -> Result<TileMap, serde_json::Error> {
    serde_json::from_str(json)
}
