//! Structured logging for runners and binaries.
//!
//! `JobLogger` gives every runner the same lifecycle log lines with the
//! job ID, job type and runner ID attached as tracing fields.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use darkroom_models::Job;

/// Install the global tracing subscriber.
///
/// `LOG_FORMAT=json` selects JSON lines; anything else gives ANSI text.
/// `RUST_LOG` is honoured, with `directives` added on top.
pub fn init_tracing(directives: &[&str]) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(d) => env_filter = env_filter.add_directive(d),
            Err(e) => eprintln!("ignoring log directive {:?}: {}", directive, e),
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Per-job logger with consistent structured fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    job_type: &'static str,
    runner_id: String,
}

impl JobLogger {
    pub fn new(job: &Job, runner_id: &str) -> Self {
        Self {
            job_id: job.id.to_string(),
            job_type: job.job_type.as_str(),
            runner_id: runner_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            job_type = self.job_type,
            runner_id = %self.runner_id,
            "Runner started: {}", message
        );
    }

    pub fn log_progress(&self, percent: u8) {
        tracing::debug!(
            job_id = %self.job_id,
            job_type = self.job_type,
            runner_id = %self.runner_id,
            percent,
            "Runner progress"
        );
    }

    /// Log that the runner observed its cancellation token.
    pub fn log_cancelled(&self) {
        warn!(
            job_id = %self.job_id,
            job_type = self.job_type,
            runner_id = %self.runner_id,
            "Runner stopping: cancelled"
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            job_type = self.job_type,
            runner_id = %self.runner_id,
            "Runner error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            job_type = self.job_type,
            runner_id = %self.runner_id,
            "Runner finished: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    /// Tracing span carrying the job fields.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "runner_job",
            job_id = %self.job_id,
            job_type = self.job_type,
            runner_id = %self.runner_id
        )
    }
}
