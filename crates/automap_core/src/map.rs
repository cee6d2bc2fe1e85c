//! Tile maps: a fixed-size grid with an ordered stack of layers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Layer, Properties, Rect, TileId};

/// A complete map: layers plus custom properties
///
/// Rule maps and target maps are both `TileMap`s. Only top-level layers are
/// addressable by name; group layers are opaque containers here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileMap {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

impl TileMap {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            width,
            height,
            layers: Vec::new(),
            properties: Properties::new(),
        }
    }

    /// Append a layer on top of the stack and return its index
    pub fn add_layer(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    /// Append a new empty tile layer sized to the map and return its index
    pub fn add_tile_layer(&mut self, name: impl Into<String>) -> usize {
        let layer = Layer::new_tile_layer(name, self.width, self.height);
        self.add_layer(layer)
    }

    /// The rectangle covered by the map
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.bounds().contains(x, y)
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// First top-level tile layer called `name`
    pub fn tile_layer(&self, name: &str) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|l| l.name == name && l.is_tile_layer())
    }

    pub fn tile_layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers
            .iter_mut()
            .find(|l| l.name == name && l.is_tile_layer())
    }

    /// Lowest top-level tile layer, if any
    pub fn first_tile_layer(&self) -> Option<&Layer> {
        self.layers.iter().find(|l| l.is_tile_layer())
    }

    /// Tile at `(x, y)` on layer `layer`; missing layers read as empty
    pub fn tile(&self, layer: &str, x: i32, y: i32) -> TileId {
        self.tile_layer(layer)
            .map(|l| l.tile_at(x, y))
            .unwrap_or(TileId::EMPTY)
    }

    /// Set a tile, returning the previous value, or `None` if the layer is
    /// missing or the cell lies outside the map.
    pub fn set_tile(&mut self, layer: &str, x: i32, y: i32, tile: TileId) -> Option<TileId> {
        self.tile_layer_mut(layer)?.set_tile(x, y, tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_access_by_layer_name() {
        let mut map = TileMap::new("target", 4, 3);
        map.add_tile_layer("ground");
        assert_eq!(map.set_tile("ground", 1, 2, TileId(3)), Some(TileId::EMPTY));
        assert_eq!(map.tile("ground", 1, 2), TileId(3));
        assert_eq!(map.tile("missing", 1, 2), TileId::EMPTY);
        assert_eq!(map.set_tile("missing", 0, 0, TileId(1)), None);
        assert_eq!(map.set_tile("ground", 4, 0, TileId(1)), None);
    }

    #[test]
    fn tile_layer_skips_other_layer_kinds() {
        let mut map = TileMap::new("m", 2, 2);
        map.add_layer(Layer::new_object_layer("ground"));
        assert!(map.tile_layer("ground").is_none());
        assert!(map.layer("ground").is_some());
        assert!(map.first_tile_layer().is_none());
        map.add_tile_layer("ground");
        assert!(map.tile_layer("ground").is_some());
        assert_eq!(map.first_tile_layer().map(|l| l.name.as_str()), Some("ground"));
    }

    #[test]
    fn deserializes_minimal_json() {
        let json = r#"{
            "width": 2,
            "height": 1,
            "layers": [
                { "name": "ground", "data": { "Tiles": { "width": 2, "height": 1, "tiles": [0, 5] } } }
            ],
            "properties": { "DeleteTiles": true }
        }"#;
        let map: TileMap = serde_json::from_str(json).unwrap();
        assert_eq!(map.tile("ground", 1, 0), TileId(5));
        assert!(map.layers[0].visible);
        assert_eq!(map.properties.get("DeleteTiles").and_then(|v| v.as_bool()), Some(true));
    }
}
