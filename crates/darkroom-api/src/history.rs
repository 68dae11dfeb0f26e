//! Bounded record of recently finished jobs.
//!
//! The queue forgets a job as soon as it reaches a terminal state, so the
//! API keeps the last few here to answer lookups after completion.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use darkroom_models::{Job, JobId, QueueEvent};

pub struct JobHistory {
    limit: usize,
    entries: RwLock<VecDeque<Job>>,
}

impl JobHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: RwLock::new(VecDeque::with_capacity(limit)),
        }
    }

    /// Remember a terminal job, evicting the oldest entry when full.
    pub async fn record(&self, job: Job) {
        if self.limit == 0 {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.push_front(job);
        entries.truncate(self.limit);
    }

    /// Newest first.
    pub async fn recent(&self, limit: Option<usize>) -> Vec<Job> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .take(limit.unwrap_or(self.limit))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &JobId) -> Option<Job> {
        let entries = self.entries.read().await;
        entries.iter().find(|job| &job.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Feed terminal jobs from the event stream into `history` until the queue
/// drops its sender.
pub fn spawn_history_recorder(
    history: Arc<JobHistory>,
    mut events: broadcast::Receiver<QueueEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(job) = event.terminal_job() {
                        debug!(job_id = %job.id, status = job.status.as_str(), "Recording finished job");
                        history.record(job.clone()).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Job history fell behind the event stream");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use darkroom_models::{JobSpec, JobStatus, JobType};

    fn finished(status: JobStatus) -> Job {
        let mut job = Job::from_spec(JobSpec::new(JobType::Export));
        job.status = status;
        job
    }

    #[tokio::test]
    async fn test_bounded_newest_first() {
        let history = JobHistory::new(2);
        let a = finished(JobStatus::Completed);
        let b = finished(JobStatus::Failed);
        let c = finished(JobStatus::Cancelled);

        history.record(a.clone()).await;
        history.record(b.clone()).await;
        history.record(c.clone()).await;

        let ids: Vec<_> = history.recent(None).await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![c.id.clone(), b.id.clone()]);
        assert!(history.get(&a.id).await.is_none());
        assert_eq!(history.get(&b.id).await.unwrap().status, JobStatus::Failed);
        assert_eq!(history.recent(Some(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_limit_keeps_nothing() {
        let history = JobHistory::new(0);
        history.record(finished(JobStatus::Completed)).await;
        assert_eq!(history.len().await, 0);
    }

    #[tokio::test]
    async fn test_recorder_keeps_only_terminal_jobs() {
        let (tx, rx) = broadcast::channel(16);
        let history = Arc::new(JobHistory::new(10));
        let handle = spawn_history_recorder(Arc::clone(&history), rx);

        let queued = Job::from_spec(JobSpec::new(JobType::Export));
        let done = finished(JobStatus::Completed);
        tx.send(QueueEvent::JobQueued { job: queued.clone() }).unwrap();
        tx.send(QueueEvent::JobFailed {
            job: done.clone(),
            error: "boom".to_string(),
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(history.len().await, 1);
        assert!(history.get(&done.id).await.is_some());
        assert!(history.get(&queued.id).await.is_none());
    }
}
