//! External command runner.
//!
//! Runs a configured program once per job. Argument templates may use
//! `{input}`, `{output}`, `{job_id}` and `{type}`. Lines of the form
//! `PROGRESS <n>` on stdout are forwarded as progress, and the child is
//! killed when the job's token fires.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::Instrument;

use darkroom_models::{Job, JobResult, JobType};
use darkroom_queue::{
    clamp_percent, CancellationToken, ProgressReporter, Runner, RunnerError, RunnerResult,
};

use crate::config::WorkerConfig;
use crate::logging::JobLogger;
use crate::runners::output::resolve_output_path;

/// Stderr lines kept for failure messages.
const STDERR_TAIL_LINES: usize = 20;

pub struct CommandRunner {
    id: String,
    program: String,
    args: Vec<String>,
    capabilities: Vec<JobType>,
    work_dir: PathBuf,
}

impl CommandRunner {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        capabilities: &[JobType],
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: "command".to_string(),
            program: program.into(),
            args,
            capabilities: capabilities.to_vec(),
            work_dir: work_dir.into(),
        }
    }

    /// Runner for `DARKROOM_PIPELINE_COMMAND`, if one is configured.
    pub fn from_config(config: &WorkerConfig) -> Option<Self> {
        let program = config.pipeline_command.as_ref()?;
        Some(Self::new(
            program.clone(),
            config.pipeline_args.clone(),
            &config.command_capabilities,
            config.work_dir.clone(),
        ))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Substitute job placeholders into one argument template.
pub fn expand_placeholders(template: &str, job: &Job, output: &Path) -> String {
    let input = job
        .input_path
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    template
        .replace("{input}", &input)
        .replace("{output}", &output.to_string_lossy())
        .replace("{job_id}", job.id.as_str())
        .replace("{type}", job.job_type.as_str())
}

/// Parse `PROGRESS <n>` (also `PROGRESS: n` and `PROGRESS n%`).
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let rest = line.trim().strip_prefix("PROGRESS")?;
    let rest = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    rest.trim_end_matches('%').trim().parse().ok()
}

/// Next line from a child pipe, decoded lossily.
///
/// Invalid UTF-8 never ends the stream; the pipe is drained until EOF or a
/// read error so the child does not die on a closed pipe.
async fn next_lossy_line<R>(reader: &mut R) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    match reader.read_until(b'\n', &mut buf).await {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let line = String::from_utf8_lossy(&buf);
            Some(line.trim_end_matches(|c: char| c == '\n' || c == '\r').to_string())
        }
    }
}

#[async_trait]
impl Runner for CommandRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "external-command"
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
        let output = resolve_output_path(job, &self.work_dir, "command");
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| expand_placeholders(arg, job, &output))
            .collect();
        logger.log_start(&format!("{} {}", self.program, args.join(" ")));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::command(format!("failed to spawn {}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::command("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::command("stderr not captured"))?;

        let progress_task = {
            let progress = progress.clone();
            let logger = logger.clone();
            let span = logger.create_span();
            tokio::spawn(
                async move {
                    let mut stdout = BufReader::new(stdout);
                    while let Some(line) = next_lossy_line(&mut stdout).await {
                        if let Some(percent) = parse_progress_line(&line) {
                            progress.report(percent);
                            logger.log_progress(clamp_percent(percent));
                        }
                    }
                }
                .instrument(span),
            )
        };

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut stderr = BufReader::new(stderr);
            while let Some(line) = next_lossy_line(&mut stderr).await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                logger.log_cancelled();
                if let Err(e) = child.kill().await {
                    logger.log_error(&format!("failed to kill child: {}", e));
                }
                progress_task.abort();
                stderr_task.abort();
                return Ok(JobResult::cancelled());
            }
        };

        let _ = progress_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let exit = match status.code() {
                Some(code) => format!("exit code {}", code),
                None => "a signal".to_string(),
            };
            let mut message = format!("{} terminated with {}", self.program, exit);
            if !stderr_tail.is_empty() {
                message.push_str(": ");
                message.push_str(&stderr_tail);
            }
            logger.log_error(&message);
            return Ok(JobResult::failure(message));
        }

        progress.report(100.0);
        logger.log_completion(&output.display().to_string());
        Ok(JobResult::success(&output)
            .with_meta("runner", self.name())
            .with_meta("program", self.program.clone())
            .with_meta("exit_code", 0))
    }
}
