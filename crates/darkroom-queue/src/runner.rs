//! Capability-tagged runner abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use darkroom_models::{Job, JobResult, JobType};

use crate::cancellation::CancellationToken;
use crate::error::RunnerResult;
use crate::progress::ProgressReporter;

/// An executor for one or more job types.
///
/// The queue selects runners purely by [`Runner::capabilities`] and never
/// looks at how they execute. Cancellation is cooperative: implementations
/// should check `cancel` between units of work and return promptly once it
/// fires. A runner that ignores the token keeps its job running.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Stable registry key.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Job types this runner accepts.
    fn capabilities(&self) -> &[JobType];

    fn can_run(&self, job_type: JobType) -> bool {
        self.capabilities().contains(&job_type)
    }

    /// Execute one job.
    ///
    /// `Ok` with `success == false` and `Err` both fail the job.
    async fn run(
        &self,
        job: &Job,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> RunnerResult<JobResult>;

    /// Release persistent resources. Awaited on removal and queue shutdown.
    async fn shutdown(&self) -> RunnerResult<()> {
        Ok(())
    }

    fn info(&self) -> RunnerInfo {
        RunnerInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            capabilities: self.capabilities().to_vec(),
        }
    }
}

/// Registry entry as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerInfo {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<JobType>,
}
