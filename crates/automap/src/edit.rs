//! Edit batches: the only thing an apply cycle produces.
//!
//! The engine never mutates the target map. The caller applies an
//! [`EditBatch`] in one step, optionally through [`EditBatch::apply_to`],
//! which records the previous tiles so the whole cycle undoes as one unit.

use std::collections::{BTreeMap, HashMap};

use automap_core::{TileId, TileMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AutomapError, AutomapResult};

/// Set one cell of a named layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub layer: String,
    pub x: i32,
    pub y: i32,
    pub tile: TileId,
}

impl Edit {
    pub fn new(layer: impl Into<String>, x: i32, y: i32, tile: TileId) -> Self {
        Self {
            layer: layer.into(),
            x,
            y,
            tile,
        }
    }
}

/// Ordered edits. When two edits address the same cell the later one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditBatch {
    edits: Vec<Edit>,
    #[serde(skip)]
    limit: Option<usize>,
}

impl EditBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A batch that refuses to grow past `limit` edits.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            edits: Vec::new(),
            limit: Some(limit),
        }
    }

    /// Append an edit.
    ///
    /// Fails when the batch limit is reached or the allocator refuses to
    /// grow the batch; the batch is left unchanged in both cases.
    pub fn push(&mut self, edit: Edit) -> AutomapResult<()> {
        if let Some(limit) = self.limit {
            if self.edits.len() >= limit {
                return Err(AutomapError::EditBudgetExceeded { limit });
            }
        }
        self.edits
            .try_reserve(1)
            .map_err(|_| AutomapError::AllocationFailed)?;
        self.edits.push(edit);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edit> {
        self.edits.iter()
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn into_vec(self) -> Vec<Edit> {
        self.edits
    }

    /// The tile a cell ends up with after the batch, if the batch writes it.
    pub fn final_tile(&self, layer: &str, x: i32, y: i32) -> Option<TileId> {
        self.edits
            .iter()
            .rev()
            .find(|e| e.layer == layer && e.x == x && e.y == y)
            .map(|e| e.tile)
    }

    /// One edit per cell holding the final tile, ordered by the position of
    /// the last write to each cell.
    pub fn coalesced(&self) -> EditBatch {
        let mut last: HashMap<(&str, i32, i32), usize> = HashMap::new();
        for (idx, edit) in self.edits.iter().enumerate() {
            last.insert((edit.layer.as_str(), edit.x, edit.y), idx);
        }
        let edits = self
            .edits
            .iter()
            .enumerate()
            .filter(|(idx, e)| last.get(&(e.layer.as_str(), e.x, e.y)) == Some(idx))
            .map(|(_, e)| e.clone())
            .collect();
        EditBatch {
            edits,
            limit: self.limit,
        }
    }

    /// Write every edit into `map`, in order.
    ///
    /// Edits addressing a missing layer or a cell outside the map are
    /// skipped. The returned [`AppliedEdits`] only lists cells whose tile
    /// actually changed.
    pub fn apply_to(&self, map: &mut TileMap) -> AppliedEdits {
        let mut changes: BTreeMap<String, BTreeMap<(i32, i32), (TileId, TileId)>> = BTreeMap::new();

        for edit in &self.edits {
            let Some(old) = map.set_tile(&edit.layer, edit.x, edit.y, edit.tile) else {
                continue;
            };
            changes
                .entry(edit.layer.clone())
                .or_default()
                .entry((edit.x, edit.y))
                .and_modify(|(_, new)| *new = edit.tile)
                .or_insert((old, edit.tile));
        }

        for cells in changes.values_mut() {
            cells.retain(|_, (old, new)| old != new);
        }
        changes.retain(|_, cells| !cells.is_empty());

        AppliedEdits {
            map_id: map.id,
            changes,
        }
    }
}

impl<'a> IntoIterator for &'a EditBatch {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.iter()
    }
}

/// An applied batch that can be undone and redone as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEdits {
    pub map_id: Uuid,
    /// Per layer: `(x, y) -> (old, new)`.
    pub changes: BTreeMap<String, BTreeMap<(i32, i32), (TileId, TileId)>>,
}

impl AppliedEdits {
    /// `true` if applying the batch changed nothing.
    pub fn is_empty(&self) -> bool {
        self.changes.values().all(BTreeMap::is_empty)
    }

    pub fn changed_cells(&self) -> usize {
        self.changes.values().map(BTreeMap::len).sum()
    }

    /// Restore the previous tiles. Does nothing for a different map.
    pub fn undo(&self, map: &mut TileMap) {
        self.write(map, |(old, _)| old);
    }

    /// Re-apply the new tiles. Does nothing for a different map.
    pub fn redo(&self, map: &mut TileMap) {
        self.write(map, |(_, new)| new);
    }

    fn write(&self, map: &mut TileMap, pick: impl Fn((TileId, TileId)) -> TileId) {
        if map.id != self.map_id {
            return;
        }
        for (layer, cells) in &self.changes {
            for (&(x, y), &change) in cells {
                map.set_tile(layer, x, y, pick(change));
            }
        }
    }
}
