//! Error type for operations that fail outright (I/O, parsing, budgets).
//!
//! User-facing rule problems are [`Diagnostic`](crate::Diagnostic)s instead;
//! the manager converts these errors into diagnostics at its API boundary.

use std::path::PathBuf;

use thiserror::Error;

use crate::{Diagnostic, DiagnosticCode, DiagnosticContext};

/// Result alias for fallible engine operations.
pub type AutomapResult<T> = Result<T, AutomapError>;

#[derive(Debug, Error)]
pub enum AutomapError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid settings: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("edit batch exceeds the limit of {limit} edits")]
    EditBudgetExceeded { limit: usize },
    #[error("out of memory while growing the edit batch")]
    AllocationFailed,
}

impl AutomapError {
    /// Convert into the diagnostic reported to callers.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let detail = DiagnosticContext::new().detail(self.to_string());
        match self {
            AutomapError::Io { path, .. } => {
                Diagnostic::fatal(DiagnosticCode::FileUnreadable, detail.file(path))
            }
            AutomapError::Json { path, .. } => {
                Diagnostic::fatal(DiagnosticCode::FileParse, detail.file(path))
            }
            AutomapError::Toml(_) => Diagnostic::fatal(DiagnosticCode::FileParse, detail),
            AutomapError::EditBudgetExceeded { .. } | AutomapError::AllocationFailed => {
                Diagnostic::fatal(DiagnosticCode::EditBudgetExceeded, detail)
            }
        }
    }
}
