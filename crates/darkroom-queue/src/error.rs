//! Queue error types.

use thiserror::Error;

use darkroom_models::SpecError;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid job: {0}")]
    InvalidJob(#[from] SpecError),

    #[error("Queue is shutting down")]
    ShuttingDown,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Runner not found: {0}")]
    RunnerNotFound(String),
}

impl QueueError {
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::JobNotFound(id.into())
    }

    pub fn runner_not_found(id: impl Into<String>) -> Self {
        Self::RunnerNotFound(id.into())
    }
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Error raised from inside a runner. Any of these fails the job.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunnerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }
}
