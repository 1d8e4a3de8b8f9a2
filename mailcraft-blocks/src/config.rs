use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BlockError, BlockResult};
use crate::history::HistoryConfig;
use crate::registry::{CustomBlockConfig, Registry};
use crate::tracking::LinkParams;
use crate::validator::MAX_NESTING_DEPTH;

/// Editor session settings, usually read from `mailcraft.yaml`:
///
/// ```yaml
/// max_depth: 8
/// history:
///   redo_policy: discard
///   max_entries: 200
/// link_params:
///   source: newsletter
///   medium: email
/// custom_blocks:
///   - kind: quote
///     label: Quote
///     template: "<mj-text>{{ block.text }}</mj-text>"
///     defaultData: { text: "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_depth: usize,
    pub history: HistoryConfig,
    pub link_params: Option<LinkParams>,
    pub custom_blocks: Vec<CustomBlockConfig>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
            history: HistoryConfig::default(),
            link_params: None,
            custom_blocks: Vec::new(),
        }
    }
}

impl EditorConfig {
    pub fn from_yaml_str(yaml: &str) -> BlockResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> BlockResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| BlockError::ConfigError(format!("read {}: {}", path.display(), e)))?;
        serde_yaml::from_slice(&bytes)
            .map_err(|e| BlockError::ConfigError(format!("parse {}: {}", path.display(), e)))
    }

    /// Built-in definitions with this config's custom blocks merged on top.
    pub fn registry(&self) -> BlockResult<Registry> {
        Registry::from_config(self.custom_blocks.clone())
    }
}
