//! The rule compiler: validates a rule map and turns it into [`CompiledRule`]s.
//!
//! Validation problems never panic. Each is reported as a [`Diagnostic`];
//! fatal ones exclude the affected scope or rule, and compilation carries on
//! with the rest of the document.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use automap_core::{Layer, Properties, Rect, TileId, TileMap, Value};
use tracing::debug;

use crate::document::{collect_scopes, parse_layer_name, LayerName, RuleLayerKind, RuleScope};
use crate::{
    CompiledRule, ConstraintGrid, DiagnosticCode, DiagnosticContext, Diagnostics, EdgeHandling,
    InputAlternative, OutputGroup, OutputTile, OutputVariant, Region, RuleOptions,
};

/// Everything a rule map compiled into.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// Rules in document order: scopes first, then rule regions within a scope.
    pub rules: Vec<Arc<CompiledRule>>,
    pub diagnostics: Diagnostics,
}

/// Compile every scope of `document`.
pub fn compile_rule_document(document: &TileMap) -> CompileOutput {
    let mut output = CompileOutput::default();

    let mut base_options = RuleOptions::default();
    read_rule_options(
        &document.properties,
        &mut base_options,
        &DiagnosticContext::new(),
        &mut output.diagnostics,
    );

    for scope in collect_scopes(document) {
        let mut options = base_options.clone();
        if let Some(properties) = scope.properties {
            read_rule_options(
                properties,
                &mut options,
                &DiagnosticContext::new().scope(&scope.name),
                &mut output.diagnostics,
            );
        }
        compile_scope(&scope, options, &mut output);
    }

    debug!(
        map = %document.name,
        rules = output.rules.len(),
        diagnostics = output.diagnostics.len(),
        "compiled rule map"
    );
    output
}

// ─── Scope ───────────────────────────────────────────────────────────────────

struct InputLayer<'a> {
    layer: &'a Layer,
    index: String,
    name: String,
    negated: bool,
    strict_empty: bool,
}

struct OutputLayer<'a> {
    layer: &'a Layer,
    index: String,
    name: String,
    probability: Option<f64>,
}

#[derive(Default)]
struct ScopeLayers<'a> {
    regions: Vec<&'a Layer>,
    regions_input: Vec<&'a Layer>,
    regions_output: Vec<&'a Layer>,
    inputs: Vec<InputLayer<'a>>,
    outputs: Vec<OutputLayer<'a>>,
}

fn compile_scope(scope: &RuleScope<'_>, options: RuleOptions, output: &mut CompileOutput) {
    let scope_ctx = DiagnosticContext::new().scope(&scope.name);
    let diags = &mut output.diagnostics;
    let fatal_before = diags.fatal_count();

    let mut layers = ScopeLayers::default();
    for &layer in &scope.layers {
        let name = parse_layer_name(&layer.name);
        let Some(kind) = name.kind().cloned() else {
            debug!(scope = %scope.name, layer = %layer.name, "ignoring non-rule layer");
            continue;
        };
        let layer_ctx = scope_ctx.clone().layer(&layer.name);

        if matches!(name, LayerName::MissingUnderscore(_)) {
            diags.warning(DiagnosticCode::MissingUnderscore, layer_ctx.clone());
        }
        if !layer.is_tile_layer() {
            diags.fatal(
                DiagnosticCode::InvalidLayerType,
                layer_ctx.detail(format!("found {:?} layer", layer.layer_type())),
            );
            continue;
        }

        let is_regions = kind.is_regions();
        match kind {
            RuleLayerKind::Regions => layers.regions.push(layer),
            RuleLayerKind::RegionsInput => layers.regions_input.push(layer),
            RuleLayerKind::RegionsOutput => layers.regions_output.push(layer),
            RuleLayerKind::Input { index, name } => {
                let strict_empty = read_input_layer_properties(layer, &layer_ctx, diags);
                layers.inputs.push(InputLayer {
                    layer,
                    index,
                    name,
                    negated: false,
                    strict_empty,
                });
            }
            RuleLayerKind::InputNot { index, name } => {
                let strict_empty = read_input_layer_properties(layer, &layer_ctx, diags);
                layers.inputs.push(InputLayer {
                    layer,
                    index,
                    name,
                    negated: true,
                    strict_empty,
                });
            }
            RuleLayerKind::Output { index, name } => {
                let probability = read_output_layer_properties(layer, &layer_ctx, diags);
                layers.outputs.push(OutputLayer {
                    layer,
                    index,
                    name,
                    probability,
                });
            }
        }

        if is_regions {
            warn_all_unrecognized(&layer.properties, &layer_ctx, diags);
        }
    }

    for (group, label) in [
        (&layers.regions, "regions"),
        (&layers.regions_input, "regions_input"),
        (&layers.regions_output, "regions_output"),
    ] {
        if group.len() > 1 {
            diags.fatal(
                DiagnosticCode::DuplicateRegionsLayer,
                scope_ctx
                    .clone()
                    .layer(label)
                    .detail(format!("{} layers", group.len())),
            );
        }
    }

    if layers.inputs.is_empty() {
        diags.fatal(DiagnosticCode::NoInputLayer, scope_ctx.clone());
    }

    if diags.fatal_count() > fatal_before {
        debug!(scope = %scope.name, "scope excluded by fatal diagnostics");
        return;
    }

    let input_cells = scope_region(
        layers.regions_input.first().or(layers.regions.first()),
        layers.inputs.iter().map(|l| l.layer),
    );
    let output_cells = scope_region(
        layers.regions_output.first().or(layers.regions.first()),
        layers.outputs.iter().map(|l| l.layer),
    );

    if input_cells.is_empty() {
        diags.fatal(DiagnosticCode::EmptyInputRegion, scope_ctx.clone());
        return;
    }

    check_names(&layers, &scope_ctx, diags);
    warn_stray_output_tiles(&layers, &output_cells, &scope_ctx, diags);

    let components = input_cells.union(&output_cells).components();
    for (rule_index, component) in components.iter().enumerate() {
        let rule_ctx = scope_ctx.clone().rule(rule_index);
        let rule_input = component.intersection(&input_cells);
        let rule_output = component.intersection(&output_cells);

        if rule_input.is_empty() {
            let bounds = component.bounds();
            diags.fatal(
                DiagnosticCode::EmptyInputRegion,
                rule_ctx.position(bounds.x, bounds.y),
            );
            continue;
        }
        if rule_output.is_empty() {
            let bounds = component.bounds();
            diags.warning(
                DiagnosticCode::NoOutputRegion,
                rule_ctx.position(bounds.x, bounds.y),
            );
            continue;
        }

        let rule = build_rule(
            &scope.name,
            rule_index,
            &layers,
            &rule_input,
            &rule_output,
            options.clone(),
        );
        debug!(
            rule = %rule.label(),
            alternatives = rule.alternatives.len(),
            outputs = rule.output_groups.len(),
            "compiled rule"
        );
        output.rules.push(Arc::new(rule));
    }
}

/// Cells of `regions_layer` if present, else the bounding box of the content
/// of `fallback` layers.
fn scope_region<'a>(
    regions_layer: Option<&&'a Layer>,
    fallback: impl Iterator<Item = &'a Layer>,
) -> Region {
    match regions_layer {
        Some(layer) => Region::from_cells(layer.non_empty_tiles().map(|(x, y, _)| (x, y))),
        None => {
            let bounds = fallback.fold(Rect::default(), |acc, l| acc.union(&l.content_bounds()));
            Region::from_rect(bounds)
        }
    }
}

fn build_rule(
    scope: &str,
    index: usize,
    layers: &ScopeLayers<'_>,
    input_region: &Region,
    output_region: &Region,
    options: RuleOptions,
) -> CompiledRule {
    let bounds = input_region.bounds();
    let (ox, oy) = (bounds.x, bounds.y);

    // index -> name -> grid
    let mut alternatives: BTreeMap<&str, BTreeMap<&str, ConstraintGrid>> = BTreeMap::new();
    for input in &layers.inputs {
        let grid = alternatives
            .entry(input.index.as_str())
            .or_default()
            .entry(input.name.as_str())
            .or_insert_with(|| {
                ConstraintGrid::new(&input.name, bounds.width as u32, bounds.height as u32)
            });

        for (x, y) in input_region.cells() {
            let tile = input.layer.tile_at(x, y);
            let (gx, gy) = (x - ox, y - oy);
            if tile.is_empty() {
                if input.strict_empty && !input.negated {
                    grid.update(gx, gy, |c| c.require(TileId::EMPTY));
                }
            } else if input.negated {
                grid.update(gx, gy, |c| c.forbid(tile));
            } else {
                grid.update(gx, gy, |c| c.require(tile));
            }
        }
    }

    let alternatives = alternatives
        .into_iter()
        .map(|(index, grids)| InputAlternative {
            index: index.to_string(),
            grids: grids
                .into_values()
                .filter(|g| g.constrained_count() > 0)
                .collect(),
        })
        .collect();

    // name -> index -> variant
    let mut groups: BTreeMap<&str, BTreeMap<&str, OutputVariant>> = BTreeMap::new();
    for out in &layers.outputs {
        let variant = groups
            .entry(out.name.as_str())
            .or_default()
            .entry(out.index.as_str())
            .or_insert_with(|| OutputVariant {
                index: out.index.clone(),
                probability: out.probability.unwrap_or(1.0),
                tiles: Vec::new(),
            });

        for (x, y) in output_region.cells() {
            let tile = out.layer.tile_at(x, y);
            if !tile.is_empty() {
                variant.tiles.push(OutputTile {
                    dx: x - ox,
                    dy: y - oy,
                    tile,
                });
            }
        }
    }

    let output_groups = groups
        .into_iter()
        .map(|(name, variants)| OutputGroup {
            name: name.to_string(),
            variants: variants.into_values().collect(),
        })
        .collect();

    CompiledRule {
        scope: scope.to_string(),
        index,
        origin: (ox, oy),
        input_region: input_region.translated(-ox, -oy),
        output_region: output_region.translated(-ox, -oy),
        alternatives,
        output_groups,
        options,
    }
}

// ─── Cross checks ────────────────────────────────────────────────────────────

fn check_names(layers: &ScopeLayers<'_>, ctx: &DiagnosticContext, diags: &mut Diagnostics) {
    let inputs: BTreeSet<&str> = layers.inputs.iter().map(|l| l.name.as_str()).collect();
    let outputs: BTreeSet<&str> = layers.outputs.iter().map(|l| l.name.as_str()).collect();

    for name in inputs.difference(&outputs) {
        diags.warning(
            DiagnosticCode::UnusedInputName,
            ctx.clone().detail(format!("name '{name}'")),
        );
    }
    for name in outputs.difference(&inputs) {
        diags.warning(
            DiagnosticCode::OutputWithoutInput,
            ctx.clone().detail(format!("name '{name}'")),
        );
    }
}

fn warn_stray_output_tiles(
    layers: &ScopeLayers<'_>,
    output_cells: &Region,
    ctx: &DiagnosticContext,
    diags: &mut Diagnostics,
) {
    for out in &layers.outputs {
        let stray = out
            .layer
            .non_empty_tiles()
            .filter(|&(x, y, _)| !output_cells.contains(x, y))
            .count();
        if stray > 0 {
            diags.warning(
                DiagnosticCode::StrayOutputTiles,
                ctx.clone()
                    .layer(&out.layer.name)
                    .detail(format!("{stray} tiles ignored")),
            );
        }
    }
}

// ─── Properties ──────────────────────────────────────────────────────────────

/// Property keys compare case-insensitively and ignore underscores, so both
/// `AutomappingRadius` and `automapping_radius` are accepted.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

enum PropertyRead {
    Applied,
    Unknown,
    Invalid(&'static str),
}

fn read_rule_options(
    properties: &Properties,
    options: &mut RuleOptions,
    ctx: &DiagnosticContext,
    diags: &mut Diagnostics,
) {
    for (key, value) in properties {
        let read = apply_rule_option(options, &normalize_key(key), value);
        report_property(read, key, value, ctx, diags);
    }
}

fn apply_rule_option(options: &mut RuleOptions, key: &str, value: &Value) -> PropertyRead {
    let set_bool = |slot: &mut bool| match value.as_bool() {
        Some(b) => {
            *slot = b;
            PropertyRead::Applied
        }
        None => PropertyRead::Invalid("expected a boolean"),
    };

    match key {
        "automappingradius" => match value.as_int() {
            Some(radius) if radius >= 0 => {
                options.automapping_radius = radius.min(u32::MAX as i64) as u32;
                PropertyRead::Applied
            }
            _ => PropertyRead::Invalid("expected a non-negative integer"),
        },
        "nooverlappingoutput" | "nooverlappingrules" => {
            set_bool(&mut options.no_overlapping_output)
        }
        "deletetiles" => set_bool(&mut options.delete_tiles),
        "applywhiledrawing" => set_bool(&mut options.apply_while_drawing),
        "disabled" => set_bool(&mut options.disabled),
        "overwriteexisting" => set_bool(&mut options.overwrite_existing),
        "matchoutsidemap" => match value.as_bool() {
            Some(outside) => {
                options.edge_handling = if outside {
                    EdgeHandling::TreatAsEmpty
                } else {
                    EdgeHandling::Skip
                };
                PropertyRead::Applied
            }
            None => PropertyRead::Invalid("expected a boolean"),
        },
        _ => PropertyRead::Unknown,
    }
}

/// Returns the `strict_empty` flag.
fn read_input_layer_properties(
    layer: &Layer,
    ctx: &DiagnosticContext,
    diags: &mut Diagnostics,
) -> bool {
    let mut strict_empty = false;
    for (key, value) in &layer.properties {
        let read = match normalize_key(key).as_str() {
            "strictempty" => match value.as_bool() {
                Some(b) => {
                    strict_empty = b;
                    PropertyRead::Applied
                }
                None => PropertyRead::Invalid("expected a boolean"),
            },
            _ => PropertyRead::Unknown,
        };
        report_property(read, key, value, ctx, diags);
    }
    strict_empty
}

/// Returns the explicit `probability`, if any.
fn read_output_layer_properties(
    layer: &Layer,
    ctx: &DiagnosticContext,
    diags: &mut Diagnostics,
) -> Option<f64> {
    let mut probability = None;
    for (key, value) in &layer.properties {
        let read = match normalize_key(key).as_str() {
            "probability" => match value.as_float() {
                Some(p) if p.is_finite() && p >= 0.0 => {
                    probability = Some(p);
                    PropertyRead::Applied
                }
                _ => PropertyRead::Invalid("expected a non-negative number"),
            },
            _ => PropertyRead::Unknown,
        };
        report_property(read, key, value, ctx, diags);
    }
    probability
}

fn warn_all_unrecognized(properties: &Properties, ctx: &DiagnosticContext, diags: &mut Diagnostics) {
    for (key, value) in properties {
        report_property(PropertyRead::Unknown, key, value, ctx, diags);
    }
}

fn report_property(
    read: PropertyRead,
    key: &str,
    value: &Value,
    ctx: &DiagnosticContext,
    diags: &mut Diagnostics,
) {
    match read {
        PropertyRead::Applied => {}
        PropertyRead::Unknown => {
            diags.warning(
                DiagnosticCode::UnrecognizedProperty,
                ctx.clone().property(key),
            );
        }
        PropertyRead::Invalid(expected) => {
            diags.warning(
                DiagnosticCode::InvalidPropertyValue,
                ctx.clone()
                    .property(key)
                    .detail(format!("{expected}, got {} {value}", value.type_name())),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellConstraint;

    const G: TileId = TileId(1);
    const W: TileId = TileId(2);
    const F: TileId = TileId(3);

    fn fill(layer: &mut Layer, rect: Rect, tile: TileId) {
        for (x, y) in rect.cells() {
            layer.set_tile(x, y, tile);
        }
    }

    fn tile_layer(name: &str, size: u32, tiles: &[(i32, i32, TileId)]) -> Layer {
        let mut layer = Layer::new_tile_layer(name, size, size);
        for &(x, y, t) in tiles {
            layer.set_tile(x, y, t);
        }
        layer
    }

    /// 3×3 ground of G at (1,1), F at the centre, inputnot_water empty.
    fn ground_rule_doc() -> TileMap {
        let mut doc = TileMap::new("rules", 6, 6);
        let mut input = Layer::new_tile_layer("input_ground", 6, 6);
        fill(&mut input, Rect::new(1, 1, 3, 3), G);
        doc.add_layer(input);
        doc.add_tile_layer("inputnot_water");
        doc.add_layer(tile_layer("output_ground", 6, &[(2, 2, F)]));
        doc
    }

    #[test]
    fn compiles_single_rule_from_bounding_box() {
        let out = compile_rule_document(&ground_rule_doc());
        assert!(!out.diagnostics.has_fatal(), "{}", out.diagnostics);
        assert_eq!(out.rules.len(), 1);

        let rule = &out.rules[0];
        assert_eq!(rule.origin, (1, 1));
        assert_eq!(rule.input_region.bounds(), Rect::new(0, 0, 3, 3));
        assert_eq!(rule.alternatives.len(), 1);
        // the empty inputnot grid carries no constraints and is dropped
        assert_eq!(rule.alternatives[0].grids.len(), 1);
        let grid = &rule.alternatives[0].grids[0];
        assert_eq!(grid.layer, "ground");
        assert_eq!(grid.constrained_count(), 9);
        assert_eq!(grid.get(1, 1), &CellConstraint::MustEqual(G));

        assert_eq!(rule.output_groups.len(), 1);
        let group = &rule.output_groups[0];
        assert_eq!(group.name, "ground");
        assert_eq!(group.variants[0].tiles, vec![OutputTile { dx: 1, dy: 1, tile: F }]);
    }

    #[test]
    fn water_name_without_output_warns() {
        let out = compile_rule_document(&ground_rule_doc());
        let unused: Vec<_> = out
            .diagnostics
            .with_code(DiagnosticCode::UnusedInputName)
            .collect();
        assert_eq!(unused.len(), 1);
        assert!(unused[0].context.detail.as_deref().unwrap_or("").contains("water"));
    }

    #[test]
    fn duplicate_regions_input_is_one_fatal_for_the_scope() {
        let mut doc = ground_rule_doc();
        doc.add_tile_layer("regions_input");
        doc.add_tile_layer("regions_input");
        let out = compile_rule_document(&doc);
        assert!(out.rules.is_empty());
        assert_eq!(out.diagnostics.fatal_count(), 1);
        assert!(out.diagnostics.contains_code(DiagnosticCode::DuplicateRegionsLayer));
    }

    #[test]
    fn object_layer_named_input_is_fatal() {
        let mut doc = ground_rule_doc();
        doc.add_layer(Layer::new_object_layer("input_objects"));
        let out = compile_rule_document(&doc);
        assert!(out.rules.is_empty());
        let fatal: Vec<_> = out.diagnostics.iter().filter(|d| d.is_fatal()).collect();
        assert_eq!(fatal.len(), 1);
        assert_eq!(fatal[0].code, DiagnosticCode::InvalidLayerType);
        assert_eq!(fatal[0].context.layer.as_deref(), Some("input_objects"));
    }

    #[test]
    fn no_input_layer_is_fatal() {
        let mut doc = TileMap::new("rules", 4, 4);
        doc.add_layer(tile_layer("output_ground", 4, &[(0, 0, F)]));
        let out = compile_rule_document(&doc);
        assert!(out.rules.is_empty());
        assert!(out.diagnostics.contains_code(DiagnosticCode::NoInputLayer));
    }

    #[test]
    fn empty_input_layers_are_fatal() {
        let mut doc = TileMap::new("rules", 4, 4);
        doc.add_tile_layer("input_ground");
        doc.add_layer(tile_layer("output_ground", 4, &[(0, 0, F)]));
        let out = compile_rule_document(&doc);
        assert!(out.rules.is_empty());
        assert!(out.diagnostics.contains_code(DiagnosticCode::EmptyInputRegion));
    }

    #[test]
    fn regions_layer_splits_rules_by_component() {
        let mut doc = TileMap::new("rules", 8, 4);
        doc.add_layer(tile_layer(
            "regions",
            8,
            &[(0, 0, G), (1, 0, G), (5, 0, G), (5, 1, G)],
        ));
        doc.add_layer(tile_layer("input_ground", 8, &[(0, 0, G), (5, 0, W)]));
        doc.add_layer(tile_layer("output_ground", 8, &[(1, 0, F), (5, 1, F)]));

        let out = compile_rule_document(&doc);
        assert!(!out.diagnostics.has_fatal(), "{}", out.diagnostics);
        assert_eq!(out.rules.len(), 2);
        assert_eq!(out.rules[0].origin, (0, 0));
        assert_eq!(out.rules[1].origin, (5, 0));
        assert_eq!(
            out.rules[1].output_groups[0].variants[0].tiles,
            vec![OutputTile { dx: 0, dy: 1, tile: F }]
        );
        assert_eq!(out.rules[1].index, 1);
    }

    #[test]
    fn sibling_scope_survives_fatal_scope() {
        let mut doc = TileMap::new("rules", 6, 6);
        let broken = Layer::new_group(
            "broken",
            vec![
                Layer::new_tile_layer("regions_input", 6, 6),
                Layer::new_tile_layer("regions_input", 6, 6),
                tile_layer("input_ground", 6, &[(0, 0, G)]),
            ],
        );
        let valid = Layer::new_group(
            "valid",
            vec![
                tile_layer("input_ground", 6, &[(0, 0, G)]),
                tile_layer("output_ground", 6, &[(0, 0, F)]),
            ],
        );
        doc.add_layer(broken);
        doc.add_layer(valid);

        let out = compile_rule_document(&doc);
        assert_eq!(out.diagnostics.fatal_count(), 1);
        assert_eq!(out.rules.len(), 1);
        assert_eq!(out.rules[0].scope, "valid");
    }

    #[test]
    fn properties_configure_options() {
        let mut doc = ground_rule_doc();
        doc.properties.insert("AutomappingRadius".into(), Value::Int(2));
        doc.properties.insert("NoOverlappingRules".into(), Value::Bool(true));
        doc.properties.insert("match_outside_map".into(), Value::from("true"));
        doc.properties.insert("apply_while_drawing".into(), Value::Bool(false));

        let out = compile_rule_document(&doc);
        assert!(out.diagnostics.warnings().all(|d| d.code == DiagnosticCode::UnusedInputName));
        let options = &out.rules[0].options;
        assert_eq!(options.automapping_radius, 2);
        assert!(options.no_overlapping_output);
        assert_eq!(options.edge_handling, EdgeHandling::TreatAsEmpty);
        assert!(!options.apply_while_drawing);
    }

    #[test]
    fn scope_properties_override_document() {
        let mut doc = TileMap::new("rules", 4, 4);
        doc.properties.insert("DeleteTiles".into(), Value::Bool(true));
        let group = Layer::new_group(
            "g",
            vec![
                tile_layer("input_a", 4, &[(0, 0, G)]),
                tile_layer("output_a", 4, &[(0, 0, F)]),
            ],
        )
        .with_property("delete_tiles", false);
        doc.add_layer(group);

        let out = compile_rule_document(&doc);
        assert!(!out.rules[0].options.delete_tiles);
    }

    #[test]
    fn unknown_and_invalid_properties_warn() {
        let mut doc = ground_rule_doc();
        doc.properties.insert("Colour".into(), Value::from("red"));
        doc.properties.insert("AutomappingRadius".into(), Value::Int(-1));
        doc.layers[0]
            .properties
            .insert("probability".into(), Value::Float(0.5));

        let out = compile_rule_document(&doc);
        assert_eq!(out.rules.len(), 1);
        let unknown: Vec<_> = out
            .diagnostics
            .with_code(DiagnosticCode::UnrecognizedProperty)
            .map(|d| d.context.property.clone().unwrap_or_default())
            .collect();
        assert_eq!(unknown, vec!["Colour".to_string(), "probability".to_string()]);
        assert!(out.diagnostics.contains_code(DiagnosticCode::InvalidPropertyValue));
        assert_eq!(out.rules[0].options.automapping_radius, 0);
    }

    #[test]
    fn missing_underscore_compiles_into_nameless_group() {
        let mut doc = TileMap::new("rules", 4, 4);
        doc.add_layer(tile_layer("inputground", 4, &[(0, 0, G)]));
        doc.add_layer(tile_layer("output", 4, &[(0, 0, F)]));
        let out = compile_rule_document(&doc);
        assert_eq!(out.rules.len(), 1);
        assert_eq!(
            out.diagnostics
                .with_code(DiagnosticCode::MissingUnderscore)
                .count(),
            2
        );
        assert_eq!(out.rules[0].alternatives[0].grids[0].layer, "");
        assert_eq!(out.rules[0].output_groups[0].name, "");
    }

    #[test]
    fn output_name_without_input_warns() {
        let mut doc = ground_rule_doc();
        doc.add_layer(tile_layer("output_decor", 6, &[(2, 2, F)]));
        let out = compile_rule_document(&doc);
        assert!(out.diagnostics.contains_code(DiagnosticCode::OutputWithoutInput));
        assert_eq!(out.rules[0].output_groups.len(), 2);
    }

    #[test]
    fn indexed_layers_build_alternatives_and_variants() {
        let mut doc = TileMap::new("rules", 4, 4);
        doc.add_layer(tile_layer("regions", 4, &[(0, 0, G)]));
        doc.add_layer(tile_layer("input1_ground", 4, &[(0, 0, G)]));
        doc.add_layer(tile_layer("input2_ground", 4, &[(0, 0, W)]));
        doc.add_layer(
            tile_layer("output1_ground", 4, &[(0, 0, F)]).with_property("probability", 3.0),
        );
        doc.add_layer(tile_layer("output2_ground", 4, &[(0, 0, W)]));

        let out = compile_rule_document(&doc);
        let rule = &out.rules[0];
        let indices: Vec<_> = rule.alternatives.iter().map(|a| a.index.as_str()).collect();
        assert_eq!(indices, vec!["1", "2"]);
        let variants = &rule.output_groups[0].variants;
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].probability, 3.0);
        assert_eq!(variants[1].probability, 1.0);
    }

    #[test]
    fn strict_empty_requires_empty_cells() {
        let mut doc = TileMap::new("rules", 4, 4);
        doc.add_layer(tile_layer("regions_input", 4, &[(0, 0, G), (1, 0, G)]));
        doc.add_layer(tile_layer("input_ground", 4, &[(0, 0, G)]).with_property("StrictEmpty", true));
        doc.add_layer(tile_layer("output_ground", 4, &[(0, 0, F)]));

        let out = compile_rule_document(&doc);
        let grid = &out.rules[0].alternatives[0].grids[0];
        assert_eq!(grid.get(1, 0), &CellConstraint::MustEqual(TileId::EMPTY));
    }

    #[test]
    fn output_region_defaults_to_output_bounds() {
        let mut doc = TileMap::new("rules", 6, 6);
        doc.add_layer(tile_layer("regions_input", 6, &[(1, 1, G)]));
        doc.add_layer(tile_layer("input_ground", 6, &[(1, 1, G)]));
        // output touches the input cell, so both form one rule
        doc.add_layer(tile_layer("output_ground", 6, &[(1, 2, F)]));
        let out = compile_rule_document(&doc);
        assert_eq!(out.rules.len(), 1);
        assert_eq!(
            out.rules[0].output_groups[0].variants[0].tiles,
            vec![OutputTile { dx: 0, dy: 1, tile: F }]
        );
    }

    #[test]
    fn disconnected_output_region_is_reported() {
        let mut doc = TileMap::new("rules", 6, 6);
        doc.add_layer(tile_layer("regions_input", 6, &[(0, 0, G)]));
        doc.add_layer(tile_layer("regions_output", 6, &[(4, 4, G)]));
        doc.add_layer(tile_layer("input_ground", 6, &[(0, 0, G)]));
        doc.add_layer(tile_layer("output_ground", 6, &[(4, 4, F), (3, 3, F)]));

        let out = compile_rule_document(&doc);
        assert!(out.rules.is_empty());
        assert!(out.diagnostics.contains_code(DiagnosticCode::NoOutputRegion));
        assert!(out.diagnostics.contains_code(DiagnosticCode::EmptyInputRegion));
        assert!(out.diagnostics.contains_code(DiagnosticCode::StrayOutputTiles));
    }
}
