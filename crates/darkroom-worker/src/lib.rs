//! Execution backends for the Darkroom processing queue.
//!
//! This crate provides:
//! - `InferenceRunner`: step-based local model execution
//! - `PipelineRunner`: phased pipeline with variable latency
//! - `CommandRunner`: external program with stdout progress and kill-on-cancel
//! - Structured job logging and tracing setup shared by the binaries
//! - A self-check that pushes one job per servable type through a queue

pub mod config;
pub mod error;
pub mod logging;
pub mod runners;
pub mod selfcheck;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::{init_tracing, JobLogger};
pub use runners::{
    default_runners, register_default_runners, CommandRunner, InferenceRunner, PipelineRunner,
};
pub use selfcheck::{run_selfcheck, ProbeOutcome, SelfcheckReport};
