//! Core data structures for the automap engine
//!
//! This crate provides the plain data the engine reads and writes:
//! - `TileMap` - A map with a fixed size, layers and custom properties
//! - `Layer` - A single layer (tiles, objects, image or a group of layers)
//! - `TileId` - Identifier of a tile, with a reserved empty value
//! - `Rect` - Axis-aligned cell rectangle
//! - `Value` - Generic custom property value
//!
//! Rule maps and target maps share these types: a rule map is just a
//! `TileMap` whose layers follow the automapping naming convention.

mod geometry;
mod layer;
mod map;
mod tile;
mod value;

pub use geometry::Rect;
pub use layer::{Layer, LayerData, LayerType};
pub use map::TileMap;
pub use tile::TileId;
pub use value::{Properties, Value};
