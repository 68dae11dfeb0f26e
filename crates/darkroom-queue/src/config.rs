//! Queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the scheduler treats a head job that no registered runner accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Stop the pass at the first unservable job; nothing behind it starts.
    #[default]
    HeadOfLine,
    /// Hold back only later jobs of the same type; other types may pass.
    PerType,
}

impl SchedulingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingPolicy::HeadOfLine => "head_of_line",
            SchedulingPolicy::PerType => "per_type",
        }
    }
}

impl std::str::FromStr for SchedulingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "head_of_line" => Ok(SchedulingPolicy::HeadOfLine),
            "per_type" => Ok(SchedulingPolicy::PerType),
            other => Err(format!("unknown scheduling policy: {}", other)),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum simultaneously running jobs (at least 1)
    pub concurrency: usize,
    /// Broadcast buffer for lifecycle events
    pub event_capacity: usize,
    /// How long shutdown waits for running jobs to drain
    pub shutdown_timeout: Duration,
    pub scheduling_policy: SchedulingPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            event_capacity: 1024,
            shutdown_timeout: Duration::from_secs(30),
            scheduling_policy: SchedulingPolicy::HeadOfLine,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            concurrency: std::env::var("DARKROOM_QUEUE_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            event_capacity: std::env::var("DARKROOM_EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024),
            shutdown_timeout: Duration::from_secs(
                std::env::var("DARKROOM_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            scheduling_policy: std::env::var("DARKROOM_SCHEDULING_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_scheduling_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.scheduling_policy = policy;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
