//! The apply engine: turns a rule's match candidates into edits.
//!
//! The entry point is [`apply_rule`]. It reads a snapshot of the target map
//! and only ever appends to the cycle's [`EditBatch`].

use std::collections::HashSet;

use automap_core::{Rect, TileId, TileMap};
use rand::Rng;
use tracing::debug;

use crate::{
    target_layer, AutomapResult, CompiledRule, DiagnosticCode, DiagnosticContext, Diagnostics,
    Edit, EditBatch, MatchCandidate, OutputVariant,
};

// ─── Public entry point ───────────────────────────────────────────────────────

/// Append the edits produced by `candidates` of `rule` to `batch`.
///
/// `snapshot` is the target map as it was before the cycle started; edits
/// already in `batch` are never read back. Returns the warnings raised while
/// stamping. Fails only when `batch` refuses to grow.
pub fn apply_rule(
    rule: &CompiledRule,
    candidates: &[MatchCandidate],
    snapshot: &TileMap,
    scan_rect: Rect,
    rng: &mut impl Rng,
    batch: &mut EditBatch,
) -> AutomapResult<Diagnostics> {
    let mut report = StampReport::default();
    let edits_before = batch.len();

    if rule.options.delete_tiles {
        delete_output_tiles(rule, snapshot, scan_rect, batch, &mut report)?;
    }

    // (layer, x, y) already written by this rule, for `no_overlapping_output`
    let mut written: HashSet<(&str, i32, i32)> = HashSet::new();

    for candidate in candidates {
        let (dx, dy) = candidate.offset;

        for group in &rule.output_groups {
            let Some(layer) = target_layer(snapshot, &group.name) else {
                report.missing_layers.insert(group.name.as_str());
                continue;
            };
            let Some(variant_idx) = select_variant(&group.variants, rng) else {
                continue;
            };
            let variant = &group.variants[variant_idx];
            let layer_name = layer.name.as_str();

            if rule.options.no_overlapping_output
                && variant
                    .tiles
                    .iter()
                    .any(|t| written.contains(&(layer_name, t.dx + dx, t.dy + dy)))
            {
                continue;
            }

            for out in &variant.tiles {
                let (x, y) = (out.dx + dx, out.dy + dy);
                if !snapshot.contains(x, y) {
                    report.out_of_bounds += 1;
                    continue;
                }
                if !rule.options.overwrite_existing && !layer.tile_at(x, y).is_empty() {
                    continue;
                }
                batch.push(Edit::new(layer_name, x, y, out.tile))?;
                if rule.options.no_overlapping_output {
                    written.insert((layer_name, x, y));
                }
            }
        }
    }

    debug!(
        rule = %rule.label(),
        matches = candidates.len(),
        edits = batch.len() - edits_before,
        "applied rule"
    );
    Ok(report.into_diagnostics(rule))
}

// ─── Stamping helpers ─────────────────────────────────────────────────────────

/// Problems collected while stamping one rule, reported once each.
#[derive(Default)]
struct StampReport<'r> {
    missing_layers: HashSet<&'r str>,
    out_of_bounds: usize,
}

impl StampReport<'_> {
    fn into_diagnostics(self, rule: &CompiledRule) -> Diagnostics {
        let ctx = DiagnosticContext::new().scope(&rule.scope).rule(rule.index);
        let mut diagnostics = Diagnostics::new();

        let mut missing: Vec<&str> = self.missing_layers.into_iter().collect();
        missing.sort_unstable();
        for name in missing {
            diagnostics.warning(
                DiagnosticCode::MissingOutputLayer,
                ctx.clone().layer(display_layer_name(name)),
            );
        }
        if self.out_of_bounds > 0 {
            diagnostics.warning(
                DiagnosticCode::OutputOutOfBounds,
                ctx.detail(format!("{} tiles skipped", self.out_of_bounds)),
            );
        }
        diagnostics
    }
}

fn display_layer_name(name: &str) -> &str {
    if name.is_empty() {
        "<first tile layer>"
    } else {
        name
    }
}

/// Erase every non-empty cell of the rule's output layers inside `scan_rect`.
fn delete_output_tiles<'r>(
    rule: &'r CompiledRule,
    snapshot: &TileMap,
    scan_rect: Rect,
    batch: &mut EditBatch,
    report: &mut StampReport<'r>,
) -> AutomapResult<()> {
    let area = scan_rect.intersection(&snapshot.bounds());
    for group in &rule.output_groups {
        let Some(layer) = target_layer(snapshot, &group.name) else {
            report.missing_layers.insert(group.name.as_str());
            continue;
        };
        for (x, y) in area.cells() {
            if !layer.tile_at(x, y).is_empty() {
                batch.push(Edit::new(layer.name.as_str(), x, y, TileId::EMPTY))?;
            }
        }
    }
    Ok(())
}

/// Perform a weighted random selection over `variants`. Returns the selected
/// index, or `None` if every weight is zero.
///
/// The RNG is only consulted when more than one variant can be chosen.
fn select_variant(variants: &[OutputVariant], rng: &mut impl Rng) -> Option<usize> {
    let mut positive = variants
        .iter()
        .enumerate()
        .filter(|(_, v)| v.probability > 0.0);
    let first = positive.next()?.0;
    if positive.next().is_none() {
        return Some(first);
    }

    let total: f64 = variants
        .iter()
        .filter(|v| v.probability > 0.0)
        .map(|v| v.probability)
        .sum();
    let mut pick = rng.gen_range(0.0..total);
    let mut last = first;
    for (idx, variant) in variants.iter().enumerate() {
        if variant.probability <= 0.0 {
            continue;
        }
        if pick < variant.probability {
            return Some(idx);
        }
        pick -= variant.probability;
        last = idx;
    }

    // rounding can leave `pick` just past the last weight
    Some(last)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        scan, ConstraintGrid, InputAlternative, OutputGroup, OutputTile, Region, RuleOptions,
        AutomapError,
    };
    use rand::rngs::SmallRng;
    use rand::{RngCore, SeedableRng};

    const G: TileId = TileId(1);
    const W: TileId = TileId(2);
    const F: TileId = TileId(3);

    fn seeded_rng() -> SmallRng {
        SmallRng::seed_from_u64(0)
    }

    fn variant(probability: f64, tiles: &[(i32, i32, TileId)]) -> OutputVariant {
        OutputVariant {
            index: String::new(),
            probability,
            tiles: tiles
                .iter()
                .map(|&(dx, dy, tile)| OutputTile { dx, dy, tile })
                .collect(),
        }
    }

    /// Single-cell input requiring `G` on `ground`, writing `tiles` to `ground`.
    fn rule(tiles: &[(i32, i32, TileId)]) -> CompiledRule {
        let mut grid = ConstraintGrid::new("ground", 1, 1);
        grid.update(0, 0, |c| c.require(G));
        CompiledRule {
            scope: "<root>".into(),
            index: 0,
            origin: (0, 0),
            input_region: Region::from_rect(Rect::cell(0, 0)),
            output_region: Region::from_cells(tiles.iter().map(|&(x, y, _)| (x, y))),
            alternatives: vec![InputAlternative {
                index: String::new(),
                grids: vec![grid],
            }],
            output_groups: vec![OutputGroup {
                name: "ground".into(),
                variants: vec![variant(1.0, tiles)],
            }],
            options: RuleOptions::default(),
        }
    }

    fn row_map(tiles: &[TileId]) -> TileMap {
        let mut map = TileMap::new("target", tiles.len() as u32, 1);
        map.add_tile_layer("ground");
        for (x, &tile) in tiles.iter().enumerate() {
            map.set_tile("ground", x as i32, 0, tile);
        }
        map
    }

    fn run(rule: &CompiledRule, map: &TileMap) -> (EditBatch, Diagnostics) {
        let candidates = scan(rule, map, map.bounds());
        let mut batch = EditBatch::new();
        let diags = apply_rule(rule, &candidates, map, map.bounds(), &mut seeded_rng(), &mut batch)
            .unwrap();
        (batch, diags)
    }

    #[test]
    fn select_variant_all_zero_weight_returns_none() {
        let variants = [variant(0.0, &[]), variant(0.0, &[])];
        assert!(select_variant(&variants, &mut seeded_rng()).is_none());
    }

    #[test]
    fn select_variant_single_positive_does_not_draw() {
        let variants = [variant(0.0, &[]), variant(2.0, &[])];
        let mut rng = seeded_rng();
        let mut untouched = rng.clone();
        assert_eq!(select_variant(&variants, &mut rng), Some(1));
        assert_eq!(rng.next_u64(), untouched.next_u64());
    }

    #[test]
    fn select_variant_converges_to_weights() {
        let variants = [variant(1.0, &[]), variant(0.0, &[]), variant(3.0, &[])];
        let mut rng = SmallRng::seed_from_u64(42);
        let mut counts = [0usize; 3];
        let trials = 20_000;
        for _ in 0..trials {
            let idx = select_variant(&variants, &mut rng).unwrap();
            counts[idx] += 1;
        }
        assert_eq!(counts[1], 0);
        let share = counts[2] as f64 / trials as f64;
        assert!((share - 0.75).abs() < 0.02, "share of heavy variant was {share}");
    }

    #[test]
    fn stamps_output_at_each_match() {
        let map = row_map(&[G, W, G]);
        let (batch, diags) = run(&rule(&[(0, 0, F)]), &map);
        assert!(diags.is_empty());
        assert_eq!(
            batch.edits(),
            &[Edit::new("ground", 0, 0, F), Edit::new("ground", 2, 0, F)]
        );
    }

    #[test]
    fn matching_reads_the_snapshot_not_the_batch() {
        // writing G next to every G would cascade if edits were read back
        let map = row_map(&[G, TileId::EMPTY, TileId::EMPTY]);
        let (batch, _) = run(&rule(&[(1, 0, G)]), &map);
        assert_eq!(batch.edits(), &[Edit::new("ground", 1, 0, G)]);
    }

    #[test]
    fn no_overlapping_output_first_writer_wins() {
        let map = row_map(&[G, G, G, TileId::EMPTY]);
        let mut wide = rule(&[(0, 0, F), (1, 0, W)]);

        let (batch, _) = run(&wide, &map);
        assert_eq!(batch.len(), 6);

        wide.options.no_overlapping_output = true;
        let (batch, _) = run(&wide, &map);
        assert_eq!(
            batch.edits(),
            &[
                Edit::new("ground", 0, 0, F),
                Edit::new("ground", 1, 0, W),
                Edit::new("ground", 2, 0, F),
                Edit::new("ground", 3, 0, W),
            ]
        );
    }

    #[test]
    fn overwrite_existing_false_only_fills_empty_cells() {
        let map = row_map(&[G, TileId::EMPTY, G, W]);
        let mut r = rule(&[(1, 0, F)]);
        r.options.overwrite_existing = false;
        let (batch, diags) = run(&r, &map);
        assert_eq!(batch.edits(), &[Edit::new("ground", 1, 0, F)]);
        assert!(diags.is_empty());
    }

    #[test]
    fn delete_tiles_erases_before_stamping() {
        let mut map = row_map(&[G, W, TileId::EMPTY]);
        map.add_tile_layer("deco");
        let mut r = rule(&[(0, 0, F)]);
        r.options.delete_tiles = true;
        let (batch, _) = run(&r, &map);
        assert_eq!(
            batch.edits(),
            &[
                Edit::new("ground", 0, 0, TileId::EMPTY),
                Edit::new("ground", 1, 0, TileId::EMPTY),
                Edit::new("ground", 0, 0, F),
            ]
        );
    }

    #[test]
    fn out_of_bounds_and_missing_layers_warn_once() {
        let map = row_map(&[G, G]);
        let mut r = rule(&[(0, -1, F), (0, 0, F)]);
        r.output_groups.push(OutputGroup {
            name: "water".into(),
            variants: vec![variant(1.0, &[(0, 0, W)])],
        });
        let (batch, diags) = run(&r, &map);
        assert_eq!(batch.len(), 2);
        assert_eq!(diags.len(), 2);
        assert!(diags.contains_code(DiagnosticCode::MissingOutputLayer));
        let oob: Vec<_> = diags.with_code(DiagnosticCode::OutputOutOfBounds).collect();
        assert_eq!(oob.len(), 1);
        assert_eq!(oob[0].context.detail.as_deref(), Some("2 tiles skipped"));
    }

    #[test]
    fn nameless_group_writes_first_tile_layer() {
        let map = row_map(&[G]);
        let mut r = rule(&[(0, 0, F)]);
        r.output_groups[0].name = String::new();
        let (batch, _) = run(&r, &map);
        assert_eq!(batch.edits(), &[Edit::new("ground", 0, 0, F)]);
    }

    #[test]
    fn full_batch_aborts() {
        let map = row_map(&[G, G, G]);
        let r = rule(&[(0, 0, F)]);
        let candidates = scan(&r, &map, map.bounds());
        let mut batch = EditBatch::with_limit(2);
        let err = apply_rule(&r, &candidates, &map, map.bounds(), &mut seeded_rng(), &mut batch)
            .unwrap_err();
        assert!(matches!(err, AutomapError::EditBudgetExceeded { limit: 2 }));
    }
}
