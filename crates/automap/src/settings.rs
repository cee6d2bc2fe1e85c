//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! rules_file = "automap/rules.txt"
//! max_edits_per_cycle = 250000
//! seed = 7
//! interactive = true
//! ```
//!
//! Per-rule settings are not configured here; they live in the properties of
//! the rule maps themselves.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AutomapError, AutomapResult};

/// Default for [`AutomapSettings::max_edits_per_cycle`].
pub const DEFAULT_MAX_EDITS_PER_CYCLE: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomapSettings {
    /// Rule file or `.txt` rules index loaded by
    /// [`AutomappingManager::load_configured_rules`](crate::AutomappingManager::load_configured_rules).
    pub rules_file: Option<PathBuf>,
    /// An apply cycle producing more edits than this aborts.
    pub max_edits_per_cycle: usize,
    /// Fixed seed for [`AutomappingManager::apply_all_with_entropy`](crate::AutomappingManager::apply_all_with_entropy).
    pub seed: Option<u64>,
    /// When `false`, `apply_to_region` does nothing.
    pub interactive: bool,
}

impl Default for AutomapSettings {
    fn default() -> Self {
        Self {
            rules_file: None,
            max_edits_per_cycle: DEFAULT_MAX_EDITS_PER_CYCLE,
            seed: None,
            interactive: true,
        }
    }
}

impl AutomapSettings {
    pub fn from_toml_str(content: &str) -> AutomapResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from a TOML file. A relative `rules_file` is resolved
    /// against the directory of the settings file.
    pub fn load(path: impl AsRef<Path>) -> AutomapResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| AutomapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_toml_str(&content)?;

        if let (Some(rules), Some(dir)) = (&settings.rules_file, path.parent()) {
            if rules.is_relative() {
                settings.rules_file = Some(dir.join(rules));
            }
        }
        Ok(settings)
    }
}
