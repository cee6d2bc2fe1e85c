//! The automapping manager: owns the compiled rule cache and runs apply cycles.
//!
//! Rule files are cached by path in load order. Each cached file moves through
//! [`RuleFileState`]; a reload that fails keeps the last good rules active.
//! An apply cycle never touches the target map, it returns an [`EditBatch`]
//! the caller applies in one step.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use automap_core::{Rect, TileMap};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    apply_rule, compile_rule_document, missing_input_layers, scan, AutomapError, AutomapSettings,
    CompiledRule, Diagnostic, DiagnosticCode, DiagnosticContext, Diagnostics, EditBatch,
    JsonMapReader, MapReader,
};

/// Identifies a loaded rule file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleHandle(Uuid);

impl RuleHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one cached rule file.
#[derive(Debug, Clone, Default)]
pub enum RuleFileState {
    /// Not in the cache.
    #[default]
    Unloaded,
    /// Being read and compiled.
    Loading,
    Compiled { rules: Vec<Arc<CompiledRule>> },
    /// The last load failed. `last_good` holds the rules of the last
    /// successful load, which stay active.
    Error {
        reason: Diagnostics,
        last_good: Option<Vec<Arc<CompiledRule>>>,
    },
}

impl RuleFileState {
    /// Rules that take part in apply cycles.
    pub fn active_rules(&self) -> &[Arc<CompiledRule>] {
        match self {
            RuleFileState::Compiled { rules } => rules,
            RuleFileState::Error {
                last_good: Some(rules),
                ..
            } => rules,
            _ => &[],
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, RuleFileState::Compiled { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RuleFileState::Error { .. })
    }
}

static UNLOADED: RuleFileState = RuleFileState::Unloaded;

#[derive(Debug)]
struct RuleFileEntry {
    handle: RuleHandle,
    path: PathBuf,
    state: RuleFileState,
    /// Diagnostics of the most recent successful compile.
    diagnostics: Diagnostics,
}

/// Result of an apply cycle.
#[derive(Debug, Clone, Default)]
pub struct AutomapOutcome {
    pub edits: EditBatch,
    /// Warnings raised during the cycle.
    pub diagnostics: Diagnostics,
}

impl AutomapOutcome {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.diagnostics.is_empty()
    }
}

pub struct AutomappingManager {
    settings: AutomapSettings,
    reader: Box<dyn MapReader>,
    entries: Vec<RuleFileEntry>,
    load_diagnostics: Diagnostics,
}

impl Default for AutomappingManager {
    fn default() -> Self {
        Self::new(AutomapSettings::default())
    }
}

impl fmt::Debug for AutomappingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomappingManager")
            .field("settings", &self.settings)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl AutomappingManager {
    /// A manager reading rule maps as JSON.
    pub fn new(settings: AutomapSettings) -> Self {
        Self::with_reader(settings, Box::new(JsonMapReader))
    }

    pub fn with_reader(settings: AutomapSettings, reader: Box<dyn MapReader>) -> Self {
        Self {
            settings,
            reader,
            entries: Vec::new(),
            load_diagnostics: Diagnostics::new(),
        }
    }

    pub fn settings(&self) -> &AutomapSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut AutomapSettings {
        &mut self.settings
    }

    // ─── Loading ─────────────────────────────────────────────────────────────

    /// Load and compile a rule file.
    ///
    /// A path that is already cached returns its existing handle. On failure
    /// nothing is cached and the returned diagnostics contain at least one
    /// fatal entry. Warnings of a successful load are available from
    /// [`diagnostics`](Self::diagnostics).
    pub fn load_rule_file(&mut self, path: impl AsRef<Path>) -> Result<RuleHandle, Diagnostics> {
        let path = path.as_ref();
        self.load_diagnostics = Diagnostics::new();
        self.load_rule_file_inner(path)
    }

    fn load_rule_file_inner(&mut self, path: &Path) -> Result<RuleHandle, Diagnostics> {
        if let Some(entry) = self.entries.iter().find(|e| e.path == path) {
            debug!(path = %path.display(), "rule file already loaded");
            return Ok(entry.handle);
        }

        let handle = RuleHandle::new();
        self.entries.push(RuleFileEntry {
            handle,
            path: path.to_path_buf(),
            state: RuleFileState::Loading,
            diagnostics: Diagnostics::new(),
        });

        match self.compile_file(path) {
            Ok((rules, diagnostics)) => {
                info!(path = %path.display(), rules = rules.len(), "loaded rule file");
                self.load_diagnostics.extend(diagnostics.iter().cloned());
                if let Some(entry) = self.entry_mut(handle) {
                    entry.state = RuleFileState::Compiled { rules };
                    entry.diagnostics = diagnostics;
                }
                Ok(handle)
            }
            Err(reason) => {
                warn!(path = %path.display(), "failed to load rule file:\n{reason}");
                self.entries.retain(|e| e.handle != handle);
                self.load_diagnostics.extend(reason.iter().cloned());
                Err(reason)
            }
        }
    }

    /// Load every rule file listed in a `.txt` rules index.
    ///
    /// One path per line, relative to the index file. Blank lines and lines
    /// starting with `#` or `//` are ignored. Listed `.txt` files are read as
    /// nested indexes. Files that fail to load and index cycles are reported
    /// in [`load_diagnostics`](Self::load_diagnostics) without stopping the
    /// rest of the index. Fails only if the index itself cannot be read.
    pub fn load_rules_index(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<RuleHandle>, Diagnostics> {
        self.load_diagnostics = Diagnostics::new();
        let mut handles = Vec::new();
        let mut stack = Vec::new();
        self.load_index_recursive(path.as_ref(), &mut stack, &mut handles)?;
        Ok(handles)
    }

    fn load_index_recursive(
        &mut self,
        path: &Path,
        stack: &mut Vec<PathBuf>,
        handles: &mut Vec<RuleHandle>,
    ) -> Result<(), Diagnostics> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            Diagnostics::from(
                AutomapError::Io {
                    path: path.to_path_buf(),
                    source,
                }
                .to_diagnostic(),
            )
        })?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        stack.push(index_key(path));

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            let entry = dir.join(line);

            if is_rules_index(&entry) {
                if stack.contains(&index_key(&entry)) {
                    warn!(path = %entry.display(), "rules index includes itself");
                    self.load_diagnostics.warning(
                        DiagnosticCode::IndexCycle,
                        DiagnosticContext::new().file(path).detail(line),
                    );
                    continue;
                }
                if let Err(reason) = self.load_index_recursive(&entry, stack, handles) {
                    self.load_diagnostics.append(reason);
                }
                continue;
            }

            if let Ok(handle) = self.load_rule_file_inner(&entry) {
                if !handles.contains(&handle) {
                    handles.push(handle);
                }
            }
        }

        stack.pop();
        Ok(())
    }

    /// Load `settings.rules_file`, as an index if it ends in `.txt`.
    pub fn load_configured_rules(&mut self) -> Result<Vec<RuleHandle>, Diagnostics> {
        let Some(path) = self.settings.rules_file.clone() else {
            return Ok(Vec::new());
        };
        if is_rules_index(&path) {
            self.load_rules_index(path)
        } else {
            self.load_rule_file(path).map(|handle| vec![handle])
        }
    }

    /// Re-read and recompile a loaded rule file.
    ///
    /// On failure the file enters [`RuleFileState::Error`] and its previously
    /// compiled rules stay active.
    pub fn reload(&mut self, handle: RuleHandle) -> Result<(), Diagnostics> {
        self.load_diagnostics = Diagnostics::new();
        let Some(entry) = self.entry_mut(handle) else {
            return Err(unknown_handle(handle));
        };
        let previous = std::mem::replace(&mut entry.state, RuleFileState::Loading);
        let path = entry.path.clone();

        let last_good = match previous {
            RuleFileState::Compiled { rules } => Some(rules),
            RuleFileState::Error { last_good, .. } => last_good,
            RuleFileState::Unloaded | RuleFileState::Loading => None,
        };

        let result = self.compile_file(&path);
        let Some(entry) = self.entry_mut(handle) else {
            return Err(unknown_handle(handle));
        };
        match result {
            Ok((rules, diagnostics)) => {
                info!(path = %path.display(), rules = rules.len(), "reloaded rule file");
                entry.state = RuleFileState::Compiled { rules };
                entry.diagnostics = diagnostics.clone();
                self.load_diagnostics = diagnostics;
                Ok(())
            }
            Err(reason) => {
                warn!(
                    path = %path.display(),
                    keeps_last_good = last_good.is_some(),
                    "failed to reload rule file:\n{reason}"
                );
                entry.state = RuleFileState::Error {
                    reason: reason.clone(),
                    last_good,
                };
                self.load_diagnostics = reason.clone();
                Err(reason)
            }
        }
    }

    /// Drop a rule file from the cache. Returns `false` for unknown handles.
    pub fn unload(&mut self, handle: RuleHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        let removed = self.entries.len() != before;
        if removed {
            debug!(%handle, "unloaded rule file");
        }
        removed
    }

    /// Unknown handles report [`RuleFileState::Unloaded`].
    pub fn state(&self, handle: RuleHandle) -> &RuleFileState {
        self.entry(handle).map_or(&UNLOADED, |e| &e.state)
    }

    /// Handles of every cached file, in load order.
    pub fn handles(&self) -> Vec<RuleHandle> {
        self.entries.iter().map(|e| e.handle).collect()
    }

    pub fn path(&self, handle: RuleHandle) -> Option<&Path> {
        self.entry(handle).map(|e| e.path.as_path())
    }

    /// Rules of `handle` that currently take part in apply cycles.
    pub fn rules(&self, handle: RuleHandle) -> &[Arc<CompiledRule>] {
        self.state(handle).active_rules()
    }

    /// Compile diagnostics of the last successful load of `handle`.
    pub fn diagnostics(&self, handle: RuleHandle) -> Option<&Diagnostics> {
        self.entry(handle).map(|e| &e.diagnostics)
    }

    /// Everything reported by the most recent load, index load or reload.
    pub fn load_diagnostics(&self) -> &Diagnostics {
        &self.load_diagnostics
    }

    fn entry(&self, handle: RuleHandle) -> Option<&RuleFileEntry> {
        self.entries.iter().find(|e| e.handle == handle)
    }

    fn entry_mut(&mut self, handle: RuleHandle) -> Option<&mut RuleFileEntry> {
        self.entries.iter_mut().find(|e| e.handle == handle)
    }

    /// Read and compile one file. Fails when the file cannot be read or
    /// parsed, or when no rule survives compilation.
    fn compile_file(
        &self,
        path: &Path,
    ) -> Result<(Vec<Arc<CompiledRule>>, Diagnostics), Diagnostics> {
        let document = self
            .reader
            .read_map(path)
            .map_err(|e| Diagnostics::from(e.to_diagnostic()))?;

        let mut output = compile_rule_document(&document);
        output.diagnostics.set_file(path);

        if output.rules.is_empty() {
            output.diagnostics.fatal(
                DiagnosticCode::NoRulesCompiled,
                DiagnosticContext::new().file(path),
            );
            return Err(output.diagnostics);
        }
        Ok((output.rules, output.diagnostics))
    }

    // ─── Applying ────────────────────────────────────────────────────────────

    /// Run every enabled rule over the whole map.
    ///
    /// Files run in load order, rules in document order. Fails with a single
    /// fatal diagnostic when the cycle exceeds `max_edits_per_cycle`.
    pub fn apply_all(
        &self,
        map: &TileMap,
        rng: &mut impl Rng,
    ) -> Result<AutomapOutcome, Diagnostics> {
        let bounds = map.bounds();
        self.run_cycle(map, rng, |_| Some(bounds))
    }

    /// [`apply_all`](Self::apply_all) with a generator seeded from
    /// `settings.seed`, or from system entropy when unset.
    pub fn apply_all_with_entropy(&self, map: &TileMap) -> Result<AutomapOutcome, Diagnostics> {
        let mut rng = match self.settings.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        self.apply_all(map, &mut rng)
    }

    /// Run the rules marked `apply_while_drawing` around `touched` cells.
    ///
    /// Each rule scans the bounds of `touched` grown by its
    /// `automapping_radius`, clipped to the map.
    pub fn apply_to_region(
        &self,
        map: &TileMap,
        touched: &[(i32, i32)],
        rng: &mut impl Rng,
    ) -> Result<AutomapOutcome, Diagnostics> {
        if !self.settings.interactive || touched.is_empty() {
            return Ok(AutomapOutcome::default());
        }

        let touched_bounds = touched
            .iter()
            .fold(Rect::default(), |acc, &(x, y)| acc.union(&Rect::cell(x, y)));
        let map_bounds = map.bounds();
        // a larger radius cannot reach more of the map
        let max_radius = reach(&touched_bounds, &map_bounds);

        self.run_cycle(map, rng, |rule| {
            if !rule.options.apply_while_drawing {
                return None;
            }
            let radius = i64::from(rule.options.automapping_radius).min(max_radius);
            let radius = i32::try_from(radius).unwrap_or(i32::MAX);
            let area = touched_bounds.expanded(radius).intersection(&map_bounds);
            (!area.is_empty()).then_some(area)
        })
    }

    fn run_cycle(
        &self,
        map: &TileMap,
        rng: &mut impl Rng,
        scan_area: impl Fn(&CompiledRule) -> Option<Rect>,
    ) -> Result<AutomapOutcome, Diagnostics> {
        let mut batch = EditBatch::with_limit(self.settings.max_edits_per_cycle);
        let mut diagnostics = Diagnostics::new();

        for entry in &self.entries {
            if let RuleFileState::Error {
                last_good: Some(_),
                ..
            } = &entry.state
            {
                diagnostics.warning(
                    DiagnosticCode::StaleRules,
                    DiagnosticContext::new().file(&entry.path),
                );
            }

            for rule in entry.state.active_rules() {
                let rule: &CompiledRule = rule;
                if rule.options.disabled {
                    continue;
                }
                let Some(area) = scan_area(rule) else {
                    continue;
                };

                for name in missing_input_layers(rule, map) {
                    diagnostics.warning(
                        DiagnosticCode::MissingInputLayer,
                        DiagnosticContext::new()
                            .file(&entry.path)
                            .scope(&rule.scope)
                            .rule(rule.index)
                            .layer(name),
                    );
                }

                let candidates = scan(rule, map, area);
                match apply_rule(rule, &candidates, map, area, rng, &mut batch) {
                    Ok(mut warnings) => {
                        warnings.set_file(&entry.path);
                        diagnostics.append(warnings);
                    }
                    Err(err) => {
                        warn!(rule = %rule.label(), "aborting apply cycle: {err}");
                        let mut diagnostic = err.to_diagnostic();
                        diagnostic.context.file = Some(entry.path.clone());
                        return Err(Diagnostics::from(diagnostic));
                    }
                }
            }
        }

        debug!(
            map = %map.name,
            edits = batch.len(),
            warnings = diagnostics.len(),
            "apply cycle finished"
        );
        Ok(AutomapOutcome {
            edits: batch,
            diagnostics,
        })
    }
}

/// Distance `from` must grow on every side to cover `to`.
fn reach(from: &Rect, to: &Rect) -> i64 {
    [
        i64::from(from.x) - i64::from(to.x),
        i64::from(from.y) - i64::from(to.y),
        i64::from(to.right()) - i64::from(from.right()),
        i64::from(to.bottom()) - i64::from(from.bottom()),
    ]
    .into_iter()
    .fold(0, i64::max)
}

fn is_rules_index(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
}

/// Identity of an index file on the cycle stack; `a/../index.txt` and
/// `index.txt` are the same file.
fn index_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn unknown_handle(handle: RuleHandle) -> Diagnostics {
    Diagnostics::from(Diagnostic::fatal(
        DiagnosticCode::UnknownHandle,
        DiagnosticContext::new().detail(handle.to_string()),
    ))
}
