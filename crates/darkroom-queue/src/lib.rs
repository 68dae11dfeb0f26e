//! In-process processing queue for Darkroom.
//!
//! This crate provides:
//! - `ProcessingQueue`: FIFO scheduling onto capability-tagged runners
//!   under a concurrency limit, with lifecycle events over a broadcast channel
//! - The `Runner` trait implemented by execution backends
//! - `CancellationToken` and `ProgressReporter`, the two handles a runner
//!   receives for each job

pub mod cancellation;
pub mod config;
pub mod error;
pub mod progress;
pub mod queue;
pub mod runner;

pub use cancellation::{CancellationToken, REASON_SHUTDOWN, REASON_USER_CANCELLED};
pub use config::{QueueConfig, SchedulingPolicy};
pub use error::{QueueError, QueueResult, RunnerError, RunnerResult};
pub use progress::{clamp_percent, ProgressReporter};
pub use queue::{ProcessingQueue, QueueStats};
pub use runner::{Runner, RunnerInfo};
