//! Rule-based automapping engine for tile maps.
//!
//! Rule maps are ordinary tile maps whose layer names follow a convention
//! (`regions`, `input_<name>`, `inputnot_<name>`, `output_<name>`). The
//! [`AutomappingManager`] loads and compiles them with
//! [`compile_rule_document`], then applies the compiled rules to a target
//! [`TileMap`](automap_core::TileMap) with [`AutomappingManager::apply_all`]
//! or, while drawing, [`AutomappingManager::apply_to_region`].
//!
//! Applying never mutates the target map. A cycle returns an [`EditBatch`]
//! that the caller applies in one step, so the whole cycle undoes as one unit.
//! Problems in rule maps are reported as structured [`Diagnostic`]s.

mod apply;
mod compile;
mod diagnostics;
mod document;
mod edit;
mod error;
mod manager;
mod reader;
mod region;
mod scan;
mod settings;
mod types;

pub use apply::apply_rule;
pub use compile::{compile_rule_document, CompileOutput};
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticContext, Diagnostics, Severity};
pub use document::{collect_scopes, parse_layer_name, LayerName, RuleLayerKind, RuleScope, ROOT_SCOPE};
pub use edit::{AppliedEdits, Edit, EditBatch};
pub use error::{AutomapError, AutomapResult};
pub use manager::{AutomapOutcome, AutomappingManager, RuleFileState, RuleHandle};
pub use reader::{load_map_from_str, JsonMapReader, MapReader};
pub use region::Region;
pub use scan::{missing_input_layers, scan};
pub use settings::{AutomapSettings, DEFAULT_MAX_EDITS_PER_CYCLE};
pub use types::{
    target_layer, CellConstraint, CompiledRule, ConstraintGrid, EdgeHandling, InputAlternative,
    MatchCandidate, OutputGroup, OutputTile, OutputVariant, RuleOptions,
};
