//! Job definitions for queue processing.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::options::JobOptions;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(format!("job-{}", Uuid::new_v4()))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of processing operation a job requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// AI super-resolution (upscaling)
    SuperRes,
    /// AI inpainting with a mask
    Inpaint,
    /// Object detection
    ObjectDetect,
    /// Detect-and-replace an object region
    ObjectReplace,
    /// Format export
    Export,
    /// Format import (RAW decode and friends)
    Import,
    /// Anything else, parameters carried as a generic map
    Custom,
}

impl JobType {
    /// All job types, in declaration order.
    pub const ALL: [JobType; 7] = [
        JobType::SuperRes,
        JobType::Inpaint,
        JobType::ObjectDetect,
        JobType::ObjectReplace,
        JobType::Export,
        JobType::Import,
        JobType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::SuperRes => "super_res",
            JobType::Inpaint => "inpaint",
            JobType::ObjectDetect => "object_detect",
            JobType::ObjectReplace => "object_replace",
            JobType::Export => "export",
            JobType::Import => "import",
            JobType::Custom => "custom",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SpecError::UnknownJobType(s.to_string()))
    }
}

/// Lifecycle state of a job.
///
/// `Queued -> Running -> {Completed | Failed | Cancelled}` and
/// `Queued -> Cancelled`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the pending queue
    #[default]
    Queued,
    /// Executing on a runner
    Running,
    /// Runner reported success
    Completed,
    /// Runner errored or reported failure
    Failed,
    /// Cancelled before or during execution
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the job state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected job submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Options of kind '{options}' do not apply to job type '{job_type}'")]
    OptionsMismatch { job_type: JobType, options: String },

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

/// A job submission, as received from callers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSpec {
    /// Operation kind
    #[serde(rename = "type")]
    pub job_type: JobType,

    /// Source image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_path: Option<PathBuf>,

    /// Requested destination (runners synthesize one when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Operation parameters
    #[serde(default, deserialize_with = "crate::options::deserialize_lenient")]
    #[schemars(with = "JobOptions")]
    pub options: JobOptions,
}

impl JobSpec {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            input_path: None,
            output_path: None,
            options: JobOptions::default(),
        }
    }

    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    /// Check that the options fit the job type.
    pub fn validate(&self) -> Result<(), SpecError> {
        if !self.options.applies_to(self.job_type) {
            return Err(SpecError::OptionsMismatch {
                job_type: self.job_type,
                options: self.options.kind().to_string(),
            });
        }
        self.options.validate()
    }
}

/// One requested unit of work and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Operation kind
    #[serde(rename = "type")]
    pub job_type: JobType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    #[serde(deserialize_with = "crate::options::deserialize_lenient")]
    #[schemars(with = "JobOptions")]
    pub options: JobOptions,

    pub status: JobStatus,

    /// Progress percentage (0-100)
    pub progress: u8,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Runner metadata plus output path, set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Failure message, set on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Create a queued job from a submission.
    pub fn from_spec(spec: JobSpec) -> Self {
        Self {
            id: JobId::new(),
            job_type: spec.job_type,
            input_path: spec.input_path,
            output_path: spec.output_path,
            options: spec.options,
            status: JobStatus::Queued,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
