//! Structured diagnostics reported by the compiler, the apply engine and the
//! manager.
//!
//! Diagnostics are values, not pre-rendered strings: a presentation layer can
//! match on [`DiagnosticCode`] and localize. The `Display` impls exist for
//! logging.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// The rule still applies, possibly with reduced fidelity.
    Warning,
    /// The rule, scope, file or apply cycle named in the context is excluded.
    Fatal,
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// More than one `regions`, `regions_input` or `regions_output` layer in a scope.
    DuplicateRegionsLayer,
    /// A reserved rule layer is not a tile layer.
    InvalidLayerType,
    /// A scope has no `input*` / `inputnot*` layer at all.
    NoInputLayer,
    /// A rule region has no input cells.
    EmptyInputRegion,
    /// A property the engine does not know, or on a layer where it has no meaning.
    UnrecognizedProperty,
    /// A known property with a value of the wrong type or range.
    InvalidPropertyValue,
    /// A layer looks like a rule layer but has no `_` before its name.
    MissingUnderscore,
    /// An input name has no output group with the same name.
    UnusedInputName,
    /// An output group name has no input with the same name.
    OutputWithoutInput,
    /// A rule region has no output cells; the rule is dropped.
    NoOutputRegion,
    /// Output template tiles lying outside every output region.
    StrayOutputTiles,
    /// A rule or index file could not be read.
    FileUnreadable,
    /// A rule or index file could not be parsed.
    FileParse,
    /// A rule file produced no usable rule.
    NoRulesCompiled,
    /// A rules index file includes itself, directly or indirectly.
    IndexCycle,
    /// A reload failed and the previously compiled rules are still in use.
    StaleRules,
    /// A rule handle that the manager does not know.
    UnknownHandle,
    /// A rule reads a layer the target map does not have; it reads as empty.
    MissingInputLayer,
    /// A rule writes a layer the target map does not have; those writes are skipped.
    MissingOutputLayer,
    /// Output tiles that would land outside the target map; they are skipped.
    OutputOutOfBounds,
    /// The apply cycle produced more edits than allowed, or ran out of memory.
    EditBudgetExceeded,
}

impl DiagnosticCode {
    /// Short English description, used by `Display`.
    pub fn message(self) -> &'static str {
        match self {
            DiagnosticCode::DuplicateRegionsLayer => "more than one regions layer of the same kind",
            DiagnosticCode::InvalidLayerType => "rule layer must be a tile layer",
            DiagnosticCode::NoInputLayer => "no input_<name> layer found",
            DiagnosticCode::EmptyInputRegion => "rule region has no input",
            DiagnosticCode::UnrecognizedProperty => "property does not make sense here",
            DiagnosticCode::InvalidPropertyValue => "property has an invalid value",
            DiagnosticCode::MissingUnderscore => "did you forget an underscore?",
            DiagnosticCode::UnusedInputName => "input name has no matching output layer",
            DiagnosticCode::OutputWithoutInput => {
                "output name has no matching input layer, did you forget an underscore?"
            }
            DiagnosticCode::NoOutputRegion => "rule region has no output",
            DiagnosticCode::StrayOutputTiles => "output tiles outside every output region",
            DiagnosticCode::FileUnreadable => "rule file could not be read",
            DiagnosticCode::FileParse => "rule file could not be parsed",
            DiagnosticCode::NoRulesCompiled => "rule file contains no usable rule",
            DiagnosticCode::IndexCycle => "rules index includes itself",
            DiagnosticCode::StaleRules => "reload failed, using last good rules",
            DiagnosticCode::UnknownHandle => "unknown rule handle",
            DiagnosticCode::MissingInputLayer => "target map has no layer read by the rule",
            DiagnosticCode::MissingOutputLayer => "target map has no layer written by the rule",
            DiagnosticCode::OutputOutOfBounds => "output outside the target map",
            DiagnosticCode::EditBudgetExceeded => "apply cycle produced too many edits",
        }
    }
}

/// Where a diagnostic applies. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Rule scope: `"<root>"` or the name of the group layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Index of the rule within its scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(i32, i32)>,
    /// Free-form detail (counts, offending values).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DiagnosticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, file: impl AsRef<Path>) -> Self {
        self.file = Some(file.as_ref().to_path_buf());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn rule(mut self, rule: usize) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn position(mut self, x: i32, y: i32) -> Self {
        self.position = Some((x, y));
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// One structured problem report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub context: DiagnosticContext,
}

impl Diagnostic {
    pub fn fatal(code: DiagnosticCode, context: DiagnosticContext) -> Self {
        Self {
            severity: Severity::Fatal,
            code,
            context,
        }
    }

    pub fn warning(code: DiagnosticCode, context: DiagnosticContext) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            context,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Fatal => "error",
        };
        write!(f, "{severity}: {}", self.code.message())?;

        let ctx = &self.context;
        let mut parts = Vec::new();
        if let Some(file) = &ctx.file {
            parts.push(format!("file '{}'", file.display()));
        }
        if let Some(scope) = &ctx.scope {
            parts.push(format!("scope '{scope}'"));
        }
        if let Some(rule) = ctx.rule {
            parts.push(format!("rule {rule}"));
        }
        if let Some(layer) = &ctx.layer {
            parts.push(format!("layer '{layer}'"));
        }
        if let Some(property) = &ctx.property {
            parts.push(format!("property '{property}'"));
        }
        if let Some((x, y)) = ctx.position {
            parts.push(format!("at ({x}, {y})"));
        }
        if let Some(detail) = &ctx.detail {
            parts.push(detail.clone());
        }
        if !parts.is_empty() {
            write!(f, " [{}]", parts.join(", "))?;
        }
        Ok(())
    }
}

/// An ordered list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn fatal(&mut self, code: DiagnosticCode, context: DiagnosticContext) {
        self.push(Diagnostic::fatal(code, context));
    }

    pub fn warning(&mut self, code: DiagnosticCode, context: DiagnosticContext) {
        self.push(Diagnostic::warning(code, context));
    }

    pub fn append(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.0.iter().any(Diagnostic::is_fatal)
    }

    pub fn fatal_count(&self) -> usize {
        self.0.iter().filter(|d| d.is_fatal()).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| !d.is_fatal())
    }

    /// All diagnostics carrying `code`.
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(move |d| d.code == code)
    }

    pub fn contains_code(&self, code: DiagnosticCode) -> bool {
        self.with_code(code).next().is_some()
    }

    /// Fill in `file` on every diagnostic that has none yet.
    pub fn set_file(&mut self, file: &Path) {
        for diagnostic in &mut self.0 {
            if diagnostic.context.file.is_none() {
                diagnostic.context.file = Some(file.to_path_buf());
            }
        }
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Diagnostics(vec![diagnostic])
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Diagnostics(iter.into_iter().collect())
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}
