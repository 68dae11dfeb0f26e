//! Runner outcome.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a runner reports back for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Arbitrary runner metadata
    #[serde(default)]
    pub meta: Map<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    /// Successful result pointing at the produced file.
    pub fn success(output_path: impl Into<PathBuf>) -> Self {
        Self {
            success: true,
            output_path: Some(output_path.into()),
            meta: Map::new(),
            error: None,
        }
    }

    /// Failed result with a message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output_path: None,
            meta: Map::new(),
            error: Some(error.into()),
        }
    }

    /// Result for a runner that stopped after observing cancellation.
    pub fn cancelled() -> Self {
        Self::failure("cancelled")
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// The record stored on a completed job: metadata plus `output_path`.
    pub fn summary(&self) -> Value {
        let mut summary = self.meta.clone();
        summary.insert(
            "output_path".to_string(),
            self.output_path
                .as_ref()
                .map(|p| Value::String(p.to_string_lossy().into_owned()))
                .unwrap_or(Value::Null),
        );
        Value::Object(summary)
    }
}
