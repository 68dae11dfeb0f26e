//! Phased pipeline runner.
//!
//! Stands in for an external processing pipeline that advances through a
//! few coarse phases with variable latency.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use darkroom_models::{Job, JobOptions, JobResult, JobType};
use darkroom_queue::{CancellationToken, ProgressReporter, Runner, RunnerResult};

use crate::config::WorkerConfig;
use crate::logging::JobLogger;
use crate::runners::output::{materialize_output, resolve_output_path};

/// Progress reported at the end of each phase.
const PHASES: [u8; 4] = [20, 40, 70, 90];

pub struct PipelineRunner {
    id: String,
    capabilities: Vec<JobType>,
    work_dir: PathBuf,
    phase_delay: Duration,
    phase_jitter: Duration,
}

impl PipelineRunner {
    pub const DEFAULT_CAPABILITIES: [JobType; 3] =
        [JobType::Inpaint, JobType::ObjectReplace, JobType::Export];

    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            id: "pipeline".to_string(),
            capabilities: Self::DEFAULT_CAPABILITIES.to_vec(),
            work_dir: config.work_dir.clone(),
            phase_delay: config.phase_delay,
            phase_jitter: config.phase_jitter,
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

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.phase_jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.phase_delay + Duration::from_millis(extra)
    }
}

#[async_trait]
impl Runner for PipelineRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "phased-pipeline"
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
        logger.log_start(&format!("{} phases", PHASES.len()));

        for phase in PHASES {
            if cancel.is_cancelled() {
                logger.log_cancelled();
                return Ok(JobResult::cancelled());
            }
            let delay = self.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    logger.log_cancelled();
                    return Ok(JobResult::cancelled());
                }
            }
            progress.report(f64::from(phase));
            logger.log_progress(phase);
        }

        let output = resolve_output_path(job, &self.work_dir, "pipeline");
        let copied = match materialize_output(job, &output, "darkroom-pipeline-output").await {
            Ok(copied) => copied,
            Err(e) => {
                logger.log_error(&e.to_string());
                return Err(e);
            }
        };
        progress.report(100.0);

        let mut result = JobResult::success(&output)
            .with_meta("runner", self.name())
            .with_meta("copied_input", copied);
        match &job.options {
            JobOptions::Inpaint(o) => {
                result = result.with_meta("quality_mode", serde_json::to_value(o.quality_mode)?);
            }
            JobOptions::ObjectReplace(o) => {
                result = result
                    .with_meta("quality_mode", serde_json::to_value(o.quality_mode)?)
                    .with_meta("object_bbox", serde_json::to_value(o.object_bbox)?);
            }
            JobOptions::Export(o) => {
                result = result
                    .with_meta("format", o.format.extension())
                    .with_meta("quality", o.quality);
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

    use darkroom_models::{ExportFormat, ExportOptions, InpaintOptions, JobSpec};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_phases_and_input_copy() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("portrait.tiff");
        tokio::fs::write(&input, b"raw-bytes").await.unwrap();

        let runner = PipelineRunner::new(&WorkerConfig::fast(dir.path()));
        let job = Job::from_spec(
            JobSpec::new(JobType::Inpaint)
                .with_input(&input)
                .with_options(JobOptions::Inpaint(InpaintOptions::default())),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::new(job.id.clone(), move |p| sink.lock().unwrap().push(p));

        let result = runner.run(&job, reporter, CancellationToken::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(*seen.lock().unwrap(), vec![20, 40, 70, 90, 100]);
        let output = result.output_path.unwrap();
        assert!(output.to_string_lossy().ends_with("-pipeline-output.tiff"));
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"raw-bytes");
        assert_eq!(result.meta["quality_mode"], "balanced");
    }

    #[tokio::test]
    async fn test_export_meta() {
        let dir = TempDir::new().unwrap();
        let runner = PipelineRunner::new(&WorkerConfig::fast(dir.path()));
        let job = Job::from_spec(JobSpec::new(JobType::Export).with_options(JobOptions::Export(
            ExportOptions {
                format: ExportFormat::Png,
                quality: 90,
            },
        )));

        let result = runner
            .run(&job, ProgressReporter::noop(job.id.clone()), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.meta["format"], "png");
        assert_eq!(result.meta["quality"], 90);
    }

    #[tokio::test]
    async fn test_cancel_mid_phase() {
        let dir = TempDir::new().unwrap();
        let mut config = WorkerConfig::fast(dir.path());
        config.phase_delay = Duration::from_secs(30);
        let runner = PipelineRunner::new(&config);
        let job = Job::from_spec(JobSpec::new(JobType::ObjectReplace));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel_with_reason("user_cancelled");
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            runner.run(&job, ProgressReporter::noop(job.id.clone()), token),
        )
        .await
        .expect("runner returns promptly after cancel")
        .unwrap();

        assert!(!result.success);
    }

    #[test]
    fn test_jitter_bounds() {
        let mut config = WorkerConfig::fast("/tmp");
        config.phase_delay = Duration::from_millis(400);
        config.phase_jitter = Duration::from_millis(300);
        let runner = PipelineRunner::new(&config);
        for _ in 0..50 {
            let delay = runner.next_delay();
            assert!(delay >= Duration::from_millis(400) && delay <= Duration::from_millis(700));
        }
    }
}
