//! Local inference runner.
//!
//! Stands in for an in-process model runtime: it walks a fixed number of
//! inference steps, reporting up to 80%, then writes the output and
//! reports 100%.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use darkroom_models::{Job, JobOptions, JobResult, JobType};
use darkroom_queue::{CancellationToken, ProgressReporter, Runner, RunnerResult};

use crate::config::WorkerConfig;
use crate::logging::JobLogger;
use crate::runners::output::{materialize_output, resolve_output_path};

const STEPS: u32 = 10;
/// Progress reached when all inference steps are done.
const STEPS_CEILING: f64 = 80.0;

pub struct InferenceRunner {
    id: String,
    capabilities: Vec<JobType>,
    work_dir: PathBuf,
    step_delay: Duration,
}

impl InferenceRunner {
    pub const DEFAULT_CAPABILITIES: [JobType; 2] = [JobType::SuperRes, JobType::ObjectDetect];

    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            id: "inference".to_string(),
            capabilities: Self::DEFAULT_CAPABILITIES.to_vec(),
            work_dir: config.work_dir.clone(),
            step_delay: config.step_delay,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[JobType]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }
}

#[async_trait]
impl Runner for InferenceRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "local-inference"
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
        let logger = JobLogger::new(job, &self.id);
        logger.log_start(&format!("{} steps", STEPS));

        for step in 1..=STEPS {
            if cancel.is_cancelled() {
                logger.log_cancelled();
                return Ok(JobResult::cancelled());
            }
            tokio::select! {
                _ = tokio::time::sleep(self.step_delay) => {}
                _ = cancel.cancelled() => {
                    logger.log_cancelled();
                    return Ok(JobResult::cancelled());
                }
            }
            let percent = (f64::from(step) / f64::from(STEPS) * STEPS_CEILING).round();
            progress.report(percent);
            logger.log_progress(percent as u8);
        }

        let output = resolve_output_path(job, &self.work_dir, "inference");
        let copied = match materialize_output(job, &output, "darkroom-inference-output").await {
            Ok(copied) => copied,
            Err(e) => {
                logger.log_error(&e.to_string());
                return Err(e);
            }
        };
        progress.report(100.0);

        let mut result = JobResult::success(&output)
            .with_meta("runner", self.name())
            .with_meta("steps", STEPS)
            .with_meta("copied_input", copied);
        match &job.options {
            JobOptions::SuperRes(o) => {
                result = result
                    .with_meta("model", o.model.clone())
                    .with_meta("scale_factor", o.scale_factor);
            }
            JobOptions::ObjectDetect(o) => {
                result = result
                    .with_meta("model", o.model.clone())
                    .with_meta("confidence_threshold", o.confidence_threshold);
            }
            _ => {}
        }

        logger.log_completion(&output.display().to_string());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use darkroom_models::{JobSpec, SuperResOptions};
    use tempfile::TempDir;

    fn recorder(job: &Job) -> (ProgressReporter, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::new(job.id.clone(), move |p| sink.lock().unwrap().push(p));
        (reporter, seen)
    }

    #[tokio::test]
    async fn test_runs_steps_and_writes_output() {
        let dir = TempDir::new().unwrap();
        let runner = InferenceRunner::new(&WorkerConfig::fast(dir.path()));
        let job = Job::from_spec(
            JobSpec::new(JobType::SuperRes)
                .with_options(JobOptions::SuperRes(SuperResOptions { scale_factor: 4, ..Default::default() })),
        );
        let (reporter, seen) = recorder(&job);

        let result = runner.run(&job, reporter, CancellationToken::new()).await.unwrap();

        assert!(result.success);
        let output = result.output_path.clone().unwrap();
        assert!(output.starts_with(dir.path()));
        assert_eq!(tokio::fs::read_to_string(&output).await.unwrap(), "darkroom-inference-output");
        assert_eq!(result.meta["scale_factor"], 4);
        assert_eq!(result.meta["copied_input"], false);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&8));
        assert_eq!(&seen[seen.len() - 2..], &[80, 100]);
    }

    #[tokio::test]
    async fn test_observes_cancellation() {
        let dir = TempDir::new().unwrap();
        let runner = InferenceRunner::new(&WorkerConfig::fast(dir.path()));
        let job = Job::from_spec(JobSpec::new(JobType::ObjectDetect));
        let token = CancellationToken::new();
        token.cancel_with_reason("user_cancelled");

        let result = runner
            .run(&job, ProgressReporter::noop(job.id.clone()), token)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_capability_override() {
        let runner = InferenceRunner::new(&WorkerConfig::default()).with_capabilities(&[JobType::Import]);
        assert!(runner.can_run(JobType::Import));
        assert!(!runner.can_run(JobType::SuperRes));
    }
}
