//! Data types for compiled automapping rules.
//!
//! A [`CompiledRule`] is produced once by the [compiler](crate::compile_rule_document)
//! and never changes afterwards. The scanner reads its input alternatives, the
//! apply engine its output groups and options.

use automap_core::{Layer, TileId, TileMap};
use serde::{Deserialize, Serialize};

use crate::Region;

// ─── Options ─────────────────────────────────────────────────────────────────

/// How out-of-map cells are handled when a rule's input extends past the map edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EdgeHandling {
    /// Only offsets where the whole input region lies inside the map are tried.
    #[default]
    Skip,
    /// Offsets may hang over the edge; out-of-map cells read as empty.
    TreatAsEmpty,
}

/// Per-rule options, read from map and scope properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOptions {
    /// Extra cells around a touched area that are re-scanned while drawing.
    pub automapping_radius: u32,
    /// When `true`, a later match of this rule never writes a cell an earlier
    /// match of this rule already wrote in the same cycle.
    pub no_overlapping_output: bool,
    /// Erase the rule's output layers inside the scanned area before stamping.
    pub delete_tiles: bool,
    /// Run this rule from [`apply_to_region`](crate::AutomappingManager::apply_to_region).
    pub apply_while_drawing: bool,
    /// Compiled but never applied.
    pub disabled: bool,
    pub edge_handling: EdgeHandling,
    /// When `false`, output only lands on cells that were empty before the cycle.
    pub overwrite_existing: bool,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            automapping_radius: 0,
            no_overlapping_output: false,
            delete_tiles: false,
            apply_while_drawing: true,
            disabled: false,
            edge_handling: EdgeHandling::default(),
            overwrite_existing: true,
        }
    }
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// Requirement on a single target cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CellConstraint {
    /// Always matches.
    #[default]
    Unconstrained,
    /// The target cell must hold exactly this tile.
    MustEqual(TileId),
    /// The target cell must not hold this tile. An empty cell always passes
    /// unless the forbidden tile is [`TileId::EMPTY`].
    MustNotEqual(TileId),
    /// Several input layers constrain the same cell: the target must be one of
    /// `allowed` (any tile if `allowed` is empty) and none of `forbidden`.
    AnyOf {
        allowed: Vec<TileId>,
        forbidden: Vec<TileId>,
    },
}

impl CellConstraint {
    pub fn matches(&self, tile: TileId) -> bool {
        match self {
            CellConstraint::Unconstrained => true,
            CellConstraint::MustEqual(required) => tile == *required,
            CellConstraint::MustNotEqual(forbidden) => tile != *forbidden,
            CellConstraint::AnyOf { allowed, forbidden } => {
                (allowed.is_empty() || allowed.contains(&tile)) && !forbidden.contains(&tile)
            }
        }
    }

    pub fn is_constrained(&self) -> bool {
        !matches!(self, CellConstraint::Unconstrained)
    }

    /// Add "must be `tile`" to this cell.
    pub fn require(self, tile: TileId) -> Self {
        match self {
            CellConstraint::Unconstrained => CellConstraint::MustEqual(tile),
            CellConstraint::MustEqual(existing) if existing == tile => self,
            CellConstraint::MustEqual(existing) => CellConstraint::AnyOf {
                allowed: vec![existing, tile],
                forbidden: Vec::new(),
            },
            CellConstraint::MustNotEqual(forbidden) => CellConstraint::AnyOf {
                allowed: vec![tile],
                forbidden: vec![forbidden],
            },
            CellConstraint::AnyOf {
                mut allowed,
                forbidden,
            } => {
                if !allowed.contains(&tile) {
                    allowed.push(tile);
                }
                CellConstraint::AnyOf { allowed, forbidden }
            }
        }
    }

    /// Add "must not be `tile`" to this cell.
    pub fn forbid(self, tile: TileId) -> Self {
        match self {
            CellConstraint::Unconstrained => CellConstraint::MustNotEqual(tile),
            CellConstraint::MustNotEqual(existing) if existing == tile => self,
            CellConstraint::MustNotEqual(existing) => CellConstraint::AnyOf {
                allowed: Vec::new(),
                forbidden: vec![existing, tile],
            },
            CellConstraint::MustEqual(required) => CellConstraint::AnyOf {
                allowed: vec![required],
                forbidden: vec![tile],
            },
            CellConstraint::AnyOf {
                allowed,
                mut forbidden,
            } => {
                if !forbidden.contains(&tile) {
                    forbidden.push(tile);
                }
                CellConstraint::AnyOf { allowed, forbidden }
            }
        }
    }
}

/// Row-major grid of [`CellConstraint`]s for one target layer.
///
/// The grid covers the rule's input bounds; cell `(0, 0)` is the rule origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintGrid {
    /// Target layer name; empty for the nameless group.
    pub layer: String,
    pub width: u32,
    pub height: u32,
    pub cells: Vec<CellConstraint>,
}

impl ConstraintGrid {
    pub fn new(layer: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            layer: layer.into(),
            width,
            height,
            cells: vec![CellConstraint::Unconstrained; width as usize * height as usize],
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn get(&self, x: i32, y: i32) -> &CellConstraint {
        static UNCONSTRAINED: CellConstraint = CellConstraint::Unconstrained;
        self.index(x, y)
            .and_then(|idx| self.cells.get(idx))
            .unwrap_or(&UNCONSTRAINED)
    }

    pub fn update(&mut self, x: i32, y: i32, f: impl FnOnce(CellConstraint) -> CellConstraint) {
        if let Some(idx) = self.index(x, y) {
            let cell = std::mem::take(&mut self.cells[idx]);
            self.cells[idx] = f(cell);
        }
    }

    /// Constrained cells with their rule-relative positions, in raster order.
    pub fn constrained(&self) -> impl Iterator<Item = (i32, i32, &CellConstraint)> {
        let width = self.width.max(1) as usize;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_constrained())
            .map(move |(idx, c)| ((idx % width) as i32, (idx / width) as i32, c))
    }

    pub fn constrained_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_constrained()).count()
    }
}

/// One set of input layers sharing an index. All grids must hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAlternative {
    /// The `<idx>` of `input<idx>_<name>`; empty when the layer had none.
    pub index: String,
    /// Sorted by target layer name.
    pub grids: Vec<ConstraintGrid>,
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// A tile stamped relative to the rule origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTile {
    pub dx: i32,
    pub dy: i32,
    pub tile: TileId,
}

/// One possible output for a group. Empty template cells are not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputVariant {
    /// The `<idx>` of `output<idx>_<name>`.
    pub index: String,
    /// Relative selection weight. `0.0` means never selected.
    pub probability: f64,
    pub tiles: Vec<OutputTile>,
}

/// All variants writing the same target layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputGroup {
    /// Target layer name; empty for the nameless group.
    pub name: String,
    pub variants: Vec<OutputVariant>,
}

// ─── Rule ────────────────────────────────────────────────────────────────────

/// An immutable, validated rule.
///
/// All positions are relative to `origin`, the top-left corner of the input
/// region's bounds in the rule map. A match at offset `(dx, dy)` places the
/// rule cell `(x, y)` on target cell `(x + dx, y + dy)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledRule {
    /// Name of the scope the rule came from (`"<root>"` or a group layer name).
    pub scope: String,
    /// Position of the rule within its scope.
    pub index: usize,
    /// Top-left of the input bounds, in rule-map coordinates.
    pub origin: (i32, i32),
    pub input_region: Region,
    pub output_region: Region,
    /// A match needs any one alternative to hold.
    pub alternatives: Vec<InputAlternative>,
    /// Sorted by name.
    pub output_groups: Vec<OutputGroup>,
    pub options: RuleOptions,
}

impl CompiledRule {
    /// `scope#index`, for logs.
    pub fn label(&self) -> String {
        format!("{}#{}", self.scope, self.index)
    }

    /// Target layer names this rule reads, de-duplicated, in name order.
    pub fn input_layers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .alternatives
            .iter()
            .flat_map(|alt| alt.grids.iter().map(|g| g.layer.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Target layer names this rule writes, in name order.
    pub fn output_layers(&self) -> Vec<&str> {
        self.output_groups.iter().map(|g| g.name.as_str()).collect()
    }
}

/// An offset at which a rule's input holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub offset: (i32, i32),
    /// Fraction of the matching alternative's constrained cells that held;
    /// always `1.0` for an accepted match.
    pub score: Option<f32>,
}

/// Resolve a rule layer name to a tile layer of `map`. The nameless group
/// addresses the map's first tile layer.
pub fn target_layer<'a>(map: &'a TileMap, name: &str) -> Option<&'a Layer> {
    if name.is_empty() {
        map.first_tile_layer()
    } else {
        map.tile_layer(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: TileId = TileId(1);
    const W: TileId = TileId(2);

    #[test]
    fn must_not_equal_accepts_empty() {
        assert!(CellConstraint::MustNotEqual(W).matches(TileId::EMPTY));
        assert!(CellConstraint::MustNotEqual(W).matches(G));
        assert!(!CellConstraint::MustNotEqual(W).matches(W));
    }

    #[test]
    fn must_equal_is_exact() {
        assert!(CellConstraint::MustEqual(G).matches(G));
        assert!(!CellConstraint::MustEqual(G).matches(TileId::EMPTY));
        assert!(CellConstraint::MustEqual(TileId::EMPTY).matches(TileId::EMPTY));
    }

    #[test]
    fn require_twice_allows_either() {
        let c = CellConstraint::Unconstrained.require(G).require(W);
        assert!(c.matches(G));
        assert!(c.matches(W));
        assert!(!c.matches(TileId(3)));
        assert_eq!(CellConstraint::MustEqual(G).require(G), CellConstraint::MustEqual(G));
    }

    #[test]
    fn forbid_on_required_cell() {
        let c = CellConstraint::Unconstrained.require(G).forbid(W);
        assert!(c.matches(G));
        assert!(!c.matches(W));
        let only_forbid = CellConstraint::Unconstrained.forbid(G).forbid(W);
        assert!(only_forbid.matches(TileId(3)));
        assert!(only_forbid.matches(TileId::EMPTY));
        assert!(!only_forbid.matches(W));
    }

    #[test]
    fn grid_iterates_constrained_cells() {
        let mut grid = ConstraintGrid::new("ground", 3, 2);
        grid.update(2, 0, |c| c.require(G));
        grid.update(0, 1, |c| c.forbid(W));
        grid.update(5, 5, |c| c.require(G));
        let cells: Vec<_> = grid.constrained().map(|(x, y, _)| (x, y)).collect();
        assert_eq!(cells, vec![(2, 0), (0, 1)]);
        assert_eq!(grid.constrained_count(), 2);
        assert_eq!(grid.get(9, 9), &CellConstraint::Unconstrained);
    }

    #[test]
    fn nameless_group_targets_first_tile_layer() {
        let mut map = TileMap::new("m", 2, 2);
        map.add_layer(automap_core::Layer::new_object_layer("objects"));
        map.add_tile_layer("base");
        map.add_tile_layer("deco");
        assert_eq!(target_layer(&map, "").map(|l| l.name.as_str()), Some("base"));
        assert_eq!(target_layer(&map, "deco").map(|l| l.name.as_str()), Some("deco"));
        assert!(target_layer(&map, "objects").is_none());
    }
}
