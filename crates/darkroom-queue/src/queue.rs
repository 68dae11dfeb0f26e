//! Processing queue: job intake, runner matching and lifecycle tracking.
//!
//! All mutable state (pending jobs, active jobs, runner registry) lives
//! behind one mutex. A scheduling pass runs entirely under that lock, so
//! two passes never interleave on the pending list. Runner execution
//! happens on spawned tasks outside the lock.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use darkroom_models::{Job, JobId, JobResult, JobSpec, JobStatus, JobType, QueueEvent};

use crate::cancellation::{CancellationToken, REASON_SHUTDOWN, REASON_USER_CANCELLED};
use crate::config::{QueueConfig, SchedulingPolicy};
use crate::error::{QueueError, QueueResult};
use crate::progress::ProgressReporter;
use crate::runner::{Runner, RunnerInfo};

/// Error recorded when a runner fails without saying why.
const UNKNOWN_ERROR: &str = "unknown error";

/// Point-in-time queue counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub active: usize,
    pub concurrency: usize,
    pub runners: usize,
    pub shutting_down: bool,
}

struct ActiveJob {
    job: Job,
    token: CancellationToken,
    runner_id: String,
}

struct QueueState {
    pending: VecDeque<Job>,
    active: Vec<ActiveJob>,
    runners: Vec<Arc<dyn Runner>>,
    concurrency: usize,
    closed: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    active_count: watch::Sender<usize>,
    shutdown_timeout: Duration,
    policy: SchedulingPolicy,
}

/// Central scheduler dispatching jobs to capability-tagged runners.
///
/// Cheap to clone; clones share the same queue. Must be used from within a
/// Tokio runtime since job execution is spawned onto it.
#[derive(Clone)]
pub struct ProcessingQueue {
    inner: Arc<Inner>,
}

impl ProcessingQueue {
    pub fn new(config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (active_count, _) = watch::channel(0);

        info!(
            concurrency = config.concurrency.max(1),
            policy = config.scheduling_policy.as_str(),
            "Processing queue created"
        );

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    active: Vec::new(),
                    runners: Vec::new(),
                    concurrency: config.concurrency.max(1),
                    closed: false,
                }),
                events,
                active_count,
                shutdown_timeout: config.shutdown_timeout,
                policy: config.scheduling_policy,
            }),
        }
    }

    /// Subscribe to lifecycle events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Submit a job. Returns the queued record without waiting for execution.
    pub fn enqueue(&self, spec: JobSpec) -> QueueResult<Job> {
        spec.validate()?;
        let job = Job::from_spec(spec);

        {
            let mut state = self.inner.lock_state();
            if state.closed {
                return Err(QueueError::ShuttingDown);
            }
            state.pending.push_back(job.clone());
            self.inner.emit(QueueEvent::JobQueued { job: job.clone() });
        }

        info!(job_id = %job.id, job_type = %job.job_type, "Job queued");
        self.inner.schedule();
        Ok(job)
    }

    /// Snapshot of pending jobs (in queue order) followed by active jobs.
    pub fn list_jobs(&self) -> Vec<Job> {
        let state = self.inner.lock_state();
        state
            .pending
            .iter()
            .cloned()
            .chain(state.active.iter().map(|a| a.job.clone()))
            .collect()
    }

    /// The live record of a pending or active job.
    pub fn get_job(&self, id: &JobId) -> Option<Job> {
        let state = self.inner.lock_state();
        state
            .pending
            .iter()
            .find(|j| &j.id == id)
            .or_else(|| state.active.iter().map(|a| &a.job).find(|j| &j.id == id))
            .cloned()
    }

    /// Cancel a job.
    ///
    /// A pending job is removed and marked cancelled immediately. An active
    /// job only has its token signalled; it becomes cancelled once its
    /// runner returns. Returns whether the job was found.
    pub fn cancel(&self, id: &JobId) -> bool {
        {
            let mut state = self.inner.lock_state();

            if let Some(active) = state.active.iter().find(|a| &a.job.id == id) {
                info!(job_id = %id, runner_id = %active.runner_id, "Cancelling running job");
                active.token.cancel_with_reason(REASON_USER_CANCELLED);
                return true;
            }

            let Some(pos) = state.pending.iter().position(|j| &j.id == id) else {
                return false;
            };
            if let Some(job) = state.pending.remove(pos) {
                info!(job_id = %id, "Cancelled queued job");
                self.inner.emit(cancelled_before_start(job, REASON_USER_CANCELLED));
            }
        }

        // The removed job may have been blocking the head of the queue.
        self.inner.schedule();
        true
    }

    /// Set the concurrency limit to `max(1, n)`.
    ///
    /// Raising it starts more jobs right away. Lowering it never preempts;
    /// jobs over the new limit finish normally.
    pub fn set_concurrency(&self, n: usize) {
        let concurrency = n.max(1);
        {
            let mut state = self.inner.lock_state();
            state.concurrency = concurrency;
        }
        info!(concurrency, "Concurrency updated");
        self.inner.schedule();
    }

    pub fn concurrency(&self) -> usize {
        self.inner.lock_state().concurrency
    }

    /// Register a runner. A runner with the same id is replaced in place.
    pub fn add_runner(&self, runner: Arc<dyn Runner>) {
        {
            let mut state = self.inner.lock_state();
            let info = runner.info();
            match state.runners.iter().position(|r| r.id() == info.id) {
                Some(pos) => state.runners[pos] = runner,
                None => state.runners.push(runner),
            }
            info!(
                runner_id = %info.id,
                capabilities = ?info.capabilities,
                "Runner registered"
            );
            self.inner.emit(QueueEvent::RunnerAdded {
                runner_id: info.id,
                name: info.name,
                capabilities: info.capabilities,
            });
        }
        self.inner.schedule();
    }

    /// Unregister a runner and await its shutdown hook.
    ///
    /// Jobs already running on it are unaffected. Returns whether a runner
    /// with that id was registered.
    pub async fn remove_runner(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.inner.lock_state();
            let pos = state.runners.iter().position(|r| r.id() == id);
            pos.map(|pos| state.runners.remove(pos))
        };

        let Some(runner) = removed else {
            return false;
        };

        info!(runner_id = %id, "Runner removed");
        self.inner.emit(QueueEvent::RunnerRemoved {
            runner_id: id.to_string(),
        });

        if let Err(e) = runner.shutdown().await {
            warn!(runner_id = %id, "Runner shutdown hook failed: {}", e);
        }
        true
    }

    /// Registered runners in registration order.
    pub fn runners(&self) -> Vec<RunnerInfo> {
        self.inner
            .lock_state()
            .runners
            .iter()
            .map(|r| r.info())
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock_state();
        QueueStats {
            pending: state.pending.len(),
            active: state.active.len(),
            concurrency: state.concurrency,
            runners: state.runners.len(),
            shutting_down: state.closed,
        }
    }

    /// Stop the queue.
    ///
    /// Pending jobs are cancelled before the first suspension point, active
    /// jobs have their tokens signalled, and new submissions are refused.
    /// Waits up to the configured timeout for active jobs to finish, then
    /// awaits every runner's shutdown hook.
    pub async fn shutdown(&self) {
        let runners = {
            let mut state = self.inner.lock_state();
            state.closed = true;

            let pending: Vec<Job> = state.pending.drain(..).collect();
            for job in pending {
                debug!(job_id = %job.id, "Cancelling queued job on shutdown");
                self.inner.emit(cancelled_before_start(job, REASON_SHUTDOWN));
            }

            for active in &state.active {
                active.token.cancel_with_reason(REASON_SHUTDOWN);
            }

            info!(active = state.active.len(), "Processing queue shutting down");
            state.runners.clone()
        };

        let mut active_rx = self.inner.active_count.subscribe();
        let drained = tokio::time::timeout(
            self.inner.shutdown_timeout,
            active_rx.wait_for(|count| *count == 0),
        )
        .await
        .is_ok();
        if !drained {
            warn!(
                timeout_secs = self.inner.shutdown_timeout.as_secs(),
                "Active jobs did not finish before shutdown timeout"
            );
        }

        for runner in runners {
            if let Err(e) = runner.shutdown().await {
                warn!(runner_id = %runner.id(), "Runner shutdown hook failed: {}", e);
            }
        }

        info!("Processing queue stopped");
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: QueueEvent) {
        debug!(event = event.event_type(), "Queue event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// One scheduling pass: start jobs while under the concurrency limit.
    fn schedule(self: &Arc<Self>) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }

        let mut blocked: HashSet<JobType> = HashSet::new();
        let mut idx = 0;

        while state.active.len() < state.concurrency && idx < state.pending.len() {
            let job_type = state.pending[idx].job_type;
            if blocked.contains(&job_type) {
                idx += 1;
                continue;
            }

            let runner = state.runners.iter().find(|r| r.can_run(job_type)).cloned();
            let Some(runner) = runner else {
                debug!(
                    job_id = %state.pending[idx].id,
                    job_type = %job_type,
                    "No runner for job type"
                );
                match self.policy {
                    SchedulingPolicy::HeadOfLine => break,
                    SchedulingPolicy::PerType => {
                        blocked.insert(job_type);
                        idx += 1;
                        continue;
                    }
                }
            };

            let Some(mut job) = state.pending.remove(idx) else {
                break;
            };
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());

            let token = CancellationToken::new();
            state.active.push(ActiveJob {
                job: job.clone(),
                token: token.clone(),
                runner_id: runner.id().to_string(),
            });
            self.active_count.send_replace(state.active.len());

            info!(
                job_id = %job.id,
                job_type = %job.job_type,
                runner_id = %runner.id(),
                "Job started"
            );
            self.emit(QueueEvent::JobStarted {
                job: job.clone(),
                runner_id: runner.id().to_string(),
                runner_name: runner.name().to_string(),
            });

            tokio::spawn(Self::execute(Arc::clone(self), job, runner, token));
        }
    }

    async fn execute(
        inner: Arc<Self>,
        job: Job,
        runner: Arc<dyn Runner>,
        token: CancellationToken,
    ) {
        let job_id = job.id.clone();

        let reporter = {
            let weak = Arc::downgrade(&inner);
            let job_id = job_id.clone();
            ProgressReporter::new(job_id.clone(), move |progress| {
                if let Some(inner) = weak.upgrade() {
                    inner.record_progress(&job_id, progress);
                }
            })
        };

        // Run on its own task so a panicking runner surfaces as a JoinError.
        let run_token = token.clone();
        let task = tokio::spawn(async move { runner.run(&job, reporter, run_token).await });

        let outcome = match task.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(join_error_message(e)),
        };

        inner.finish(&job_id, outcome);
        inner.schedule();
    }

    fn record_progress(&self, job_id: &JobId, progress: u8) {
        let mut state = self.lock_state();
        let Some(active) = state.active.iter_mut().find(|a| &a.job.id == job_id) else {
            return;
        };
        if progress <= active.job.progress {
            return;
        }
        active.job.progress = progress;
        self.emit(QueueEvent::JobProgress {
            job_id: job_id.clone(),
            progress,
        });
    }

    /// Move a job out of the active set into its terminal state.
    fn finish(&self, job_id: &JobId, outcome: Result<JobResult, String>) {
        let mut state = self.lock_state();
        let Some(pos) = state.active.iter().position(|a| &a.job.id == job_id) else {
            return;
        };
        let ActiveJob {
            mut job,
            token,
            runner_id,
        } = state.active.remove(pos);
        job.finished_at = Some(Utc::now());

        // A cancelled token overrides whatever the runner returned.
        let event = if token.is_cancelled() {
            job.status = JobStatus::Cancelled;
            let reason = token.reason().map(str::to_string);
            info!(job_id = %job.id, runner_id = %runner_id, reason = ?reason, "Job cancelled");
            QueueEvent::JobCancelled { job, reason }
        } else {
            match outcome {
                Ok(result) if result.success => {
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    if let Some(path) = &result.output_path {
                        job.output_path = Some(path.clone());
                    }
                    job.result = Some(result.summary());
                    info!(job_id = %job.id, runner_id = %runner_id, "Job completed");
                    QueueEvent::JobCompleted { job, result }
                }
                Ok(result) => {
                    let error = result.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                    failed(job, error, &runner_id)
                }
                Err(error) => failed(job, error, &runner_id),
            }
        };

        self.emit(event);
        self.active_count.send_replace(state.active.len());
    }
}

fn failed(mut job: Job, error: String, runner_id: &str) -> QueueEvent {
    warn!(job_id = %job.id, runner_id = %runner_id, "Job failed: {}", error);
    job.status = JobStatus::Failed;
    job.error = Some(error.clone());
    QueueEvent::JobFailed { job, error }
}

fn cancelled_before_start(mut job: Job, reason: &str) -> QueueEvent {
    job.status = JobStatus::Cancelled;
    job.progress = 0;
    job.finished_at = Some(Utc::now());
    QueueEvent::JobCancelled {
        job,
        reason: Some(reason.to_string()),
    }
}

fn join_error_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return "runner task was aborted".to_string();
    }
    let panic = err.into_panic();
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("runner panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("runner panicked: {}", msg)
    } else {
        "runner panicked".to_string()
    }
}
