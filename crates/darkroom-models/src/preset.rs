//! Named operation presets and their on-disk document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current preset document version.
pub const PRESET_DOCUMENT_VERSION: u32 = 1;

/// One parameterized step of a preset chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PresetOperation {
    /// Operation name, e.g. `exposure` or `super_res`
    pub operation: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl PresetOperation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Optional descriptive metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PresetMeta {
    /// Grouping such as `Portrait`, `Landscape`, `B&W`, `Custom`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named, durable chain of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Preset {
    pub name: String,
    pub operations: Vec<PresetOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PresetMeta>,
    /// Set on first save, never changed afterwards
    pub created_at: DateTime<Utc>,
    /// Refreshed on every save
    pub updated_at: DateTime<Utc>,
}

impl Preset {
    pub fn category(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.category.as_deref())
    }
}

/// The whole preset store as persisted: `{version, presets: {name -> Preset}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PresetDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub presets: BTreeMap<String, Preset>,
}

impl Default for PresetDocument {
    fn default() -> Self {
        Self {
            version: PRESET_DOCUMENT_VERSION,
            presets: BTreeMap::new(),
        }
    }
}

fn default_version() -> u32 {
    PRESET_DOCUMENT_VERSION
}
