//! Shared runners and event helpers for scheduler tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};

use darkroom_models::{Job, JobId, JobResult, JobType, QueueEvent};
use darkroom_queue::{CancellationToken, ProgressReporter, Runner, RunnerError, RunnerResult};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// What a [`TestRunner`] does with each job.
#[derive(Clone)]
pub enum Behavior {
    /// Return success straight away.
    Succeed,
    /// Return `success = false` with the message.
    Fail(&'static str),
    /// Return `Err` with the message.
    Error(&'static str),
    Panic,
    /// Report each value in turn, then succeed.
    Progress(Vec<f64>),
    /// Wait for a gate permit or cancellation, then report success either way.
    Hold(Arc<Semaphore>),
}

pub struct TestRunner {
    id: String,
    capabilities: Vec<JobType>,
    behavior: Behavior,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub started: AtomicUsize,
    pub shutdown_called: AtomicBool,
}

impl TestRunner {
    pub fn new(id: &str, capabilities: &[JobType], behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            capabilities: capabilities.to_vec(),
            behavior,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            shutdown_called: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Runner for TestRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &[JobType] {
        &self.capabilities
    }

    async fn run(
        &self,
        job: &Job,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> RunnerResult<JobResult> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let outcome = match &self.behavior {
            Behavior::Succeed => Ok(JobResult::success(format!("/tmp/{}.png", job.id))),
            Behavior::Fail(msg) => Ok(JobResult::failure(*msg)),
            Behavior::Error(msg) => Err(RunnerError::failed(*msg)),
            Behavior::Panic => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                panic!("runner exploded");
            }
            Behavior::Progress(values) => {
                for value in values {
                    progress.report(*value);
                    tokio::task::yield_now().await;
                }
                Ok(JobResult::success(format!("/tmp/{}.png", job.id)))
            }
            Behavior::Hold(gate) => {
                tokio::select! {
                    permit = gate.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                    }
                    _ = cancel.cancelled() => {}
                }
                Ok(JobResult::success(format!("/tmp/{}.png", job.id)))
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn shutdown(&self) -> RunnerResult<()> {
        self.shutdown_called.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Receive events until `pred` matches, failing the test on timeout.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<QueueEvent>, mut pred: F) -> QueueEvent
where
    F: FnMut(&QueueEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for queue event")
}

pub async fn wait_started(rx: &mut broadcast::Receiver<QueueEvent>, id: &JobId) -> QueueEvent {
    wait_for(rx, |e| matches!(e, QueueEvent::JobStarted { job, .. } if &job.id == id)).await
}

/// Wait for the terminal event of `id` and return the final job record.
pub async fn wait_terminal(rx: &mut broadcast::Receiver<QueueEvent>, id: &JobId) -> Job {
    let event = wait_for(rx, |e| e.terminal_job().is_some_and(|job| &job.id == id)).await;
    event
        .terminal_job()
        .cloned()
        .expect("terminal event carries a job")
}

/// Wait until every id in `ids` has reached a terminal state, in any order.
pub async fn wait_all_terminal(rx: &mut broadcast::Receiver<QueueEvent>, ids: &[JobId]) -> Vec<Job> {
    let mut done: Vec<Job> = Vec::new();
    wait_for(rx, |e| {
        if let Some(job) = e.terminal_job() {
            if ids.contains(&job.id) {
                done.push(job.clone());
            }
        }
        done.len() == ids.len()
    })
    .await;
    done
}

/// Drain whatever is buffered right now without waiting.
pub fn drain(rx: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn started_ids(events: &[QueueEvent]) -> Vec<JobId> {
    events
        .iter()
        .filter_map(|e| match e {
            QueueEvent::JobStarted { job, .. } => Some(job.id.clone()),
            _ => None,
        })
        .collect()
}
