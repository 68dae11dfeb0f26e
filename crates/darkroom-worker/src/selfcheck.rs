//! End-to-end probe of the built-in runners.
//!
//! Runs one job per servable job type through a private queue and reports
//! how each one ended.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use darkroom_models::{JobId, JobSpec, JobStatus, JobType};
use darkroom_queue::{ProcessingQueue, QueueConfig};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::runners::register_default_runners;

/// Outcome of one probe job.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub job_type: JobType,
    pub status: JobStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SelfcheckReport {
    pub runners: usize,
    pub outcomes: Vec<ProbeOutcome>,
    /// Job types no registered runner can serve
    pub uncovered: Vec<JobType>,
}

impl SelfcheckReport {
    pub fn is_healthy(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == JobStatus::Completed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.iter().filter(|o| o.status != JobStatus::Completed)
    }
}

/// Register the default runners on a fresh queue and push one job per
/// servable type through it, waiting at most `deadline` for all of them.
pub async fn run_selfcheck(config: &WorkerConfig, deadline: Duration) -> WorkerResult<SelfcheckReport> {
    config.validate()?;
    tokio::fs::create_dir_all(&config.work_dir).await?;

    let queue = ProcessingQueue::new(QueueConfig::default().with_concurrency(JobType::ALL.len()));
    let mut events = queue.subscribe();
    let runners = register_default_runners(&queue, config);

    let servable: Vec<JobType> = {
        let infos = queue.runners();
        JobType::ALL
            .into_iter()
            .filter(|t| infos.iter().any(|r| r.capabilities.contains(t)))
            .collect()
    };
    let uncovered = JobType::ALL
        .into_iter()
        .filter(|t| !servable.contains(t))
        .collect();

    let mut waiting: HashMap<JobId, JobType> = HashMap::new();
    for job_type in &servable {
        let job = queue.enqueue(JobSpec::new(*job_type))?;
        waiting.insert(job.id, *job_type);
    }

    let mut outcomes = Vec::with_capacity(waiting.len());
    let collected = tokio::time::timeout(deadline, async {
        while !waiting.is_empty() {
            match events.recv().await {
                Ok(event) => {
                    let Some(job) = event.terminal_job() else { continue };
                    if let Some(job_type) = waiting.remove(&job.id) {
                        outcomes.push(ProbeOutcome {
                            job_type,
                            status: job.status,
                            error: job.error.clone(),
                        });
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Self-check event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
    .await;

    queue.shutdown().await;

    if collected.is_err() || !waiting.is_empty() {
        return Err(WorkerError::Timeout(format!(
            "{} probe job(s) unfinished after {:?}",
            waiting.len(),
            deadline
        )));
    }

    outcomes.sort_by_key(|o| JobType::ALL.iter().position(|t| *t == o.job_type));
    Ok(SelfcheckReport {
        runners,
        outcomes,
        uncovered,
    })
}
