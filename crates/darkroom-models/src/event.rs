//! Queue lifecycle notifications.
//!
//! These are the only integration point for presentation layers: every
//! state change a caller may care about is published as one of these.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId, JobType};
use crate::result::JobResult;

/// Event published by the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    JobQueued {
        job: Job,
    },

    JobStarted {
        job: Job,
        runner_id: String,
        runner_name: String,
    },

    /// Progress percentage (0-100)
    JobProgress {
        job_id: JobId,
        progress: u8,
    },

    JobCompleted {
        job: Job,
        result: JobResult,
    },

    JobFailed {
        job: Job,
        error: String,
    },

    JobCancelled {
        job: Job,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    RunnerAdded {
        runner_id: String,
        name: String,
        capabilities: Vec<JobType>,
    },

    RunnerRemoved {
        runner_id: String,
    },
}

impl QueueEvent {
    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::JobQueued { .. } => "job_queued",
            QueueEvent::JobStarted { .. } => "job_started",
            QueueEvent::JobProgress { .. } => "job_progress",
            QueueEvent::JobCompleted { .. } => "job_completed",
            QueueEvent::JobFailed { .. } => "job_failed",
            QueueEvent::JobCancelled { .. } => "job_cancelled",
            QueueEvent::RunnerAdded { .. } => "runner_added",
            QueueEvent::RunnerRemoved { .. } => "runner_removed",
        }
    }

    /// The job this event is about, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            QueueEvent::JobQueued { job }
            | QueueEvent::JobStarted { job, .. }
            | QueueEvent::JobCompleted { job, .. }
            | QueueEvent::JobFailed { job, .. }
            | QueueEvent::JobCancelled { job, .. } => Some(&job.id),
            QueueEvent::JobProgress { job_id, .. } => Some(job_id),
            QueueEvent::RunnerAdded { .. } | QueueEvent::RunnerRemoved { .. } => None,
        }
    }

    /// The final job record carried by a terminal event.
    pub fn terminal_job(&self) -> Option<&Job> {
        match self {
            QueueEvent::JobCompleted { job, .. }
            | QueueEvent::JobFailed { job, .. }
            | QueueEvent::JobCancelled { job, .. } => Some(job),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobSpec;

    #[test]
    fn test_event_wire_format() {
        let job = Job::from_spec(JobSpec::new(JobType::Export));
        let event = QueueEvent::JobProgress {
            job_id: job.id.clone(),
            progress: 40,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["progress"], 40);
        assert_eq!(event.job_id(), Some(&job.id));
        assert!(event.terminal_job().is_none());
    }

    #[test]
    fn test_terminal_events_expose_job() {
        let job = Job::from_spec(JobSpec::new(JobType::Import));
        let event = QueueEvent::JobCancelled {
            job: job.clone(),
            reason: Some("user_cancelled".to_string()),
        };
        assert_eq!(event.terminal_job().map(|j| &j.id), Some(&job.id));
    }
}
