//! The rule map naming convention.
//!
//! Layer names are parsed once into [`RuleLayerKind`]s here; the compiler and
//! everything after it only ever see the typed result.

use automap_core::{Layer, Properties, TileMap};

/// Scope name used for the top-level layers of a rule map.
pub const ROOT_SCOPE: &str = "<root>";

/// What a rule map layer is for, according to its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleLayerKind {
    /// `regions`: input and output region at once.
    Regions,
    /// `regions_input`
    RegionsInput,
    /// `regions_output`
    RegionsOutput,
    /// `input<index>_<name>`
    Input { index: String, name: String },
    /// `inputnot<index>_<name>`
    InputNot { index: String, name: String },
    /// `output<index>_<name>`
    Output { index: String, name: String },
}

impl RuleLayerKind {
    pub fn is_regions(&self) -> bool {
        matches!(
            self,
            RuleLayerKind::Regions | RuleLayerKind::RegionsInput | RuleLayerKind::RegionsOutput
        )
    }
}

/// Result of parsing a layer name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerName {
    Rule(RuleLayerKind),
    /// Starts like a rule layer but has no usable `_<name>` suffix. The kind
    /// carries an empty name, i.e. the nameless group.
    MissingUnderscore(RuleLayerKind),
    /// Not part of the convention; ignored.
    Other,
}

impl LayerName {
    pub fn kind(&self) -> Option<&RuleLayerKind> {
        match self {
            LayerName::Rule(kind) | LayerName::MissingUnderscore(kind) => Some(kind),
            LayerName::Other => None,
        }
    }
}

/// Parse a rule map layer name. Prefixes are case-insensitive, the
/// `<name>` suffix is kept as written.
pub fn parse_layer_name(name: &str) -> LayerName {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "regions" => return LayerName::Rule(RuleLayerKind::Regions),
        "regions_input" => return LayerName::Rule(RuleLayerKind::RegionsInput),
        "regions_output" => return LayerName::Rule(RuleLayerKind::RegionsOutput),
        _ => {}
    }

    type MakeKind = fn(String, String) -> RuleLayerKind;
    // `inputnot` must be tried before `input`
    let prefixes: [(&str, MakeKind); 3] = [
        ("inputnot", |index, name| RuleLayerKind::InputNot { index, name }),
        ("input", |index, name| RuleLayerKind::Input { index, name }),
        ("output", |index, name| RuleLayerKind::Output { index, name }),
    ];

    for (prefix, make) in prefixes {
        if !lower.starts_with(prefix) {
            continue;
        }
        // prefixes are ASCII, so byte offsets line up with the original name
        let rest = &name[prefix.len()..];
        return match rest.split_once('_') {
            Some((index, suffix))
                if !suffix.is_empty() && index.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                LayerName::Rule(make(index.to_string(), suffix.to_string()))
            }
            _ => LayerName::MissingUnderscore(make(String::new(), String::new())),
        };
    }

    LayerName::Other
}

/// A group of rule layers validated and compiled independently.
#[derive(Debug, Clone)]
pub struct RuleScope<'a> {
    pub name: String,
    /// Properties of the group layer that forms the scope (none for the root).
    pub properties: Option<&'a Properties>,
    /// Layers of the scope, nested groups flattened, in document order.
    pub layers: Vec<&'a Layer>,
}

impl RuleScope<'_> {
    /// `true` if any layer name belongs to the convention.
    pub fn has_rule_layers(&self) -> bool {
        self.layers
            .iter()
            .any(|l| parse_layer_name(&l.name) != LayerName::Other)
    }
}

/// Split a rule map into scopes.
///
/// Top-level layers form the root scope. A top-level group whose name is not
/// a rule layer name forms its own scope; a group that *is* named like a rule
/// layer stays in its parent scope so the compiler can reject it.
pub fn collect_scopes(document: &TileMap) -> Vec<RuleScope<'_>> {
    let mut root = RuleScope {
        name: ROOT_SCOPE.to_string(),
        properties: None,
        layers: Vec::new(),
    };
    let mut groups = Vec::new();

    for layer in &document.layers {
        match layer.children() {
            Some(children) if parse_layer_name(&layer.name) == LayerName::Other => {
                let mut scope = RuleScope {
                    name: layer.name.clone(),
                    properties: Some(&layer.properties),
                    layers: Vec::new(),
                };
                flatten_into(children, &mut scope.layers);
                groups.push(scope);
            }
            _ => root.layers.push(layer),
        }
    }

    let mut scopes = Vec::with_capacity(groups.len() + 1);
    if root.has_rule_layers() {
        scopes.push(root);
    }
    scopes.extend(groups.into_iter().filter(|s| s.has_rule_layers()));
    scopes
}

fn flatten_into<'a>(layers: &'a [Layer], out: &mut Vec<&'a Layer>) {
    for layer in layers {
        match layer.children() {
            Some(children) if parse_layer_name(&layer.name) == LayerName::Other => {
                flatten_into(children, out)
            }
            _ => out.push(layer),
        }
    }
}
