//! The match scanner: finds every offset at which a rule's input holds.

use automap_core::{Rect, TileMap};

use crate::{target_layer, CompiledRule, EdgeHandling, InputAlternative, MatchCandidate};

/// Scan `map` for matches of `rule` whose input region touches `scan_rect`.
///
/// Offsets are visited row-major (by `dy`, then `dx`), so the result is
/// deterministic for a given map. Overlapping matches are all reported.
pub fn scan(rule: &CompiledRule, map: &TileMap, scan_rect: Rect) -> Vec<MatchCandidate> {
    let map_bounds = map.bounds();
    let scan_rect = scan_rect.intersection(&map_bounds);
    let input_bounds = rule.input_region.bounds();
    if scan_rect.is_empty() || input_bounds.is_empty() {
        return Vec::new();
    }

    // every offset whose translated input bounds could touch the scan rect
    let min_dx = scan_rect.x - input_bounds.right() + 1;
    let max_dx = scan_rect.right() - 1 - input_bounds.x;
    let min_dy = scan_rect.y - input_bounds.bottom() + 1;
    let max_dy = scan_rect.bottom() - 1 - input_bounds.y;

    let mut candidates = Vec::new();
    for dy in min_dy..=max_dy {
        for dx in min_dx..=max_dx {
            // test the rule-local region against the rects moved back by the offset
            if !rule
                .input_region
                .intersects_rect(&scan_rect.translated(-dx, -dy))
            {
                continue;
            }
            if rule.options.edge_handling == EdgeHandling::Skip
                && !rule.input_region.is_within(&map_bounds.translated(-dx, -dy))
            {
                continue;
            }
            if rule
                .alternatives
                .iter()
                .any(|alt| alternative_matches(alt, map, dx, dy))
            {
                candidates.push(MatchCandidate {
                    offset: (dx, dy),
                    score: Some(1.0),
                });
            }
        }
    }
    candidates
}

fn alternative_matches(alt: &InputAlternative, map: &TileMap, dx: i32, dy: i32) -> bool {
    alt.grids.iter().all(|grid| {
        let layer = target_layer(map, &grid.layer);
        grid.constrained().all(|(x, y, constraint)| {
            // missing layers and out-of-map cells read as empty
            let tile = layer
                .map(|l| l.tile_at(x + dx, y + dy))
                .unwrap_or_default();
            constraint.matches(tile)
        })
    })
}

/// Names of layers read by `rule` that `map` does not have.
pub fn missing_input_layers<'r>(rule: &'r CompiledRule, map: &TileMap) -> Vec<&'r str> {
    rule.input_layers()
        .into_iter()
        .filter(|name| target_layer(map, name).is_none())
        .collect()
}
