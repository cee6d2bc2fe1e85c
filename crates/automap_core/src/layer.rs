//! Layer types for tile, object, image and group layers

use serde::{Deserialize, Serialize};

use crate::{Properties, Rect, TileId, Value};

/// A layer of a map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Custom properties attached to the layer
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    pub data: LayerData,
}

fn default_visible() -> bool {
    true
}

impl Layer {
    /// Create a new, empty tile layer
    pub fn new_tile_layer(name: impl Into<String>, width: u32, height: u32) -> Self {
        let size = width as usize * height as usize;
        Self {
            name: name.into(),
            visible: true,
            properties: Properties::new(),
            data: LayerData::Tiles {
                width,
                height,
                tiles: vec![TileId::EMPTY; size],
            },
        }
    }

    /// Create a new object layer
    pub fn new_object_layer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            properties: Properties::new(),
            data: LayerData::Objects {
                objects: Vec::new(),
            },
        }
    }

    /// Create a new image layer
    pub fn new_image_layer(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            properties: Properties::new(),
            data: LayerData::Image {
                source: source.into(),
            },
        }
    }

    /// Create a new group layer holding `layers`
    pub fn new_group(name: impl Into<String>, layers: Vec<Layer>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            properties: Properties::new(),
            data: LayerData::Group { layers },
        }
    }

    /// Builder-style helper to attach a custom property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Get the type of this layer
    pub fn layer_type(&self) -> LayerType {
        match &self.data {
            LayerData::Tiles { .. } => LayerType::Tiles,
            LayerData::Objects { .. } => LayerType::Objects,
            LayerData::Image { .. } => LayerType::Image,
            LayerData::Group { .. } => LayerType::Group,
        }
    }

    pub fn is_tile_layer(&self) -> bool {
        matches!(self.data, LayerData::Tiles { .. })
    }

    /// Tile at `(x, y)`. Out of bounds cells and non-tile layers read as empty.
    pub fn tile_at(&self, x: i32, y: i32) -> TileId {
        match &self.data {
            LayerData::Tiles {
                width,
                height,
                tiles,
            } => {
                if x < 0 || y < 0 || x >= *width as i32 || y >= *height as i32 {
                    return TileId::EMPTY;
                }
                let idx = y as usize * *width as usize + x as usize;
                tiles.get(idx).copied().unwrap_or(TileId::EMPTY)
            }
            _ => TileId::EMPTY,
        }
    }

    /// Set the tile at `(x, y)`, returning the previous tile.
    ///
    /// Returns `None` (and changes nothing) for out of bounds cells or
    /// non-tile layers.
    pub fn set_tile(&mut self, x: i32, y: i32, tile: TileId) -> Option<TileId> {
        let LayerData::Tiles {
            width,
            height,
            tiles,
        } = &mut self.data
        else {
            return None;
        };
        if x < 0 || y < 0 || x >= *width as i32 || y >= *height as i32 {
            return None;
        }
        let idx = y as usize * *width as usize + x as usize;
        let slot = tiles.get_mut(idx)?;
        Some(std::mem::replace(slot, tile))
    }

    /// Bounding rectangle of all non-empty tiles (empty rect if none).
    pub fn content_bounds(&self) -> Rect {
        let LayerData::Tiles { width, tiles, .. } = &self.data else {
            return Rect::default();
        };
        if *width == 0 {
            return Rect::default();
        }
        let mut bounds = Rect::default();
        for (idx, tile) in tiles.iter().enumerate() {
            if !tile.is_empty() {
                let x = (idx % *width as usize) as i32;
                let y = (idx / *width as usize) as i32;
                bounds = bounds.union(&Rect::cell(x, y));
            }
        }
        bounds
    }

    /// Positions and ids of every non-empty tile, in raster order.
    pub fn non_empty_tiles(&self) -> impl Iterator<Item = (i32, i32, TileId)> + '_ {
        let (width, tiles): (usize, &[TileId]) = match &self.data {
            LayerData::Tiles { width, tiles, .. } => (*width as usize, tiles.as_slice()),
            _ => (0, &[]),
        };
        tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| !tile.is_empty())
            .map(move |(idx, tile)| ((idx % width) as i32, (idx / width) as i32, *tile))
    }

    /// Child layers if this is a group layer
    pub fn children(&self) -> Option<&[Layer]> {
        match &self.data {
            LayerData::Group { layers } => Some(layers),
            _ => None,
        }
    }
}

/// The type of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerType {
    Tiles,
    Objects,
    Image,
    Group,
}

/// The data contained in a layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LayerData {
    /// Row-major tile grid; `TileId::EMPTY` marks an empty cell
    Tiles {
        width: u32,
        height: u32,
        tiles: Vec<TileId>,
    },
    /// Object layer. The engine never reads objects; they are kept as opaque
    /// property bags so documents round-trip.
    Objects {
        #[serde(default)]
        objects: Vec<Properties>,
    },
    /// Image layer referencing an image by path
    Image { source: String },
    /// Group of nested layers
    Group {
        #[serde(default)]
        layers: Vec<Layer>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tile_layer() {
        let layer = Layer::new_tile_layer("Ground", 10, 10);

        assert_eq!(layer.name, "Ground");
        assert!(layer.visible);
        assert_eq!(layer.layer_type(), LayerType::Tiles);

        if let LayerData::Tiles { tiles, .. } = &layer.data {
            assert_eq!(tiles.len(), 100);
            assert!(tiles.iter().all(|t| t.is_empty()));
        } else {
            panic!("Expected tile layer");
        }
    }

    #[test]
    fn test_new_object_layer() {
        let layer = Layer::new_object_layer("Entities");

        assert_eq!(layer.name, "Entities");
        assert_eq!(layer.layer_type(), LayerType::Objects);
        assert_eq!(layer.tile_at(0, 0), TileId::EMPTY);
    }

    #[test]
    fn set_tile_returns_previous_and_ignores_out_of_bounds() {
        let mut layer = Layer::new_tile_layer("Ground", 3, 2);
        assert_eq!(layer.set_tile(2, 1, TileId(5)), Some(TileId::EMPTY));
        assert_eq!(layer.set_tile(2, 1, TileId(6)), Some(TileId(5)));
        assert_eq!(layer.tile_at(2, 1), TileId(6));
        assert_eq!(layer.set_tile(3, 0, TileId(1)), None);
        assert_eq!(layer.set_tile(-1, 0, TileId(1)), None);
        assert_eq!(layer.tile_at(-1, 0), TileId::EMPTY);
    }

    #[test]
    fn content_bounds_covers_non_empty_tiles() {
        let mut layer = Layer::new_tile_layer("input_ground", 8, 8);
        assert!(layer.content_bounds().is_empty());
        layer.set_tile(2, 3, TileId(1));
        layer.set_tile(5, 1, TileId(1));
        assert_eq!(layer.content_bounds(), Rect::new(2, 1, 4, 3));
    }

    #[test]
    fn non_empty_tiles_in_raster_order() {
        let mut layer = Layer::new_tile_layer("l", 3, 3);
        layer.set_tile(1, 2, TileId(9));
        layer.set_tile(2, 0, TileId(4));
        let tiles: Vec<_> = layer.non_empty_tiles().collect();
        assert_eq!(tiles, vec![(2, 0, TileId(4)), (1, 2, TileId(9))]);
    }

    #[test]
    fn group_children() {
        let group = Layer::new_group("rule1", vec![Layer::new_tile_layer("input_a", 1, 1)]);
        assert_eq!(group.layer_type(), LayerType::Group);
        assert_eq!(group.children().map(|c| c.len()), Some(1));
        assert!(Layer::new_image_layer("bg", "bg.png").children().is_none());
    }
}
