//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use darkroom_models::JobType;

use crate::error::{WorkerError, WorkerResult};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory for synthesized output files
    pub work_dir: PathBuf,
    /// Delay between inference steps
    pub step_delay: Duration,
    /// Base delay of each pipeline phase
    pub phase_delay: Duration,
    /// Random extra delay added to each pipeline phase (0..=jitter)
    pub phase_jitter: Duration,
    /// External program for the command runner; the runner is disabled when unset
    pub pipeline_command: Option<String>,
    /// Argument template for the external program
    pub pipeline_args: Vec<String>,
    /// Job types routed to the command runner
    pub command_capabilities: Vec<JobType>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("darkroom"),
            step_delay: Duration::from_millis(120),
            phase_delay: Duration::from_millis(400),
            phase_jitter: Duration::from_millis(300),
            pipeline_command: None,
            pipeline_args: vec!["{input}".to_string(), "{output}".to_string()],
            command_capabilities: vec![JobType::Custom],
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            work_dir: std::env::var("DARKROOM_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            step_delay: Duration::from_millis(
                std::env::var("DARKROOM_STEP_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            phase_delay: Duration::from_millis(
                std::env::var("DARKROOM_PHASE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(400),
            ),
            phase_jitter: Duration::from_millis(
                std::env::var("DARKROOM_PHASE_JITTER_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            pipeline_command: std::env::var("DARKROOM_PIPELINE_COMMAND")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            pipeline_args: std::env::var("DARKROOM_PIPELINE_ARGS")
                .ok()
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.pipeline_args),
            command_capabilities: std::env::var("DARKROOM_COMMAND_CAPABILITIES")
                .ok()
                .map(|s| parse_capabilities(&s))
                .filter(|caps| !caps.is_empty())
                .unwrap_or(defaults.command_capabilities),
        }
    }

    /// Config with no artificial delays, for tests and self-checks.
    pub fn fast(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            step_delay: Duration::ZERO,
            phase_delay: Duration::ZERO,
            phase_jitter: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Reject settings the runners cannot work with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.work_dir.as_os_str().is_empty() {
            return Err(WorkerError::config_error("DARKROOM_WORK_DIR must not be empty"));
        }
        if self.pipeline_command.is_some() && self.command_capabilities.is_empty() {
            return Err(WorkerError::config_error(
                "DARKROOM_PIPELINE_COMMAND is set but no capabilities are configured",
            ));
        }
        Ok(())
    }
}

/// Parse a comma-separated list of job types, skipping unknown names.
fn parse_capabilities(raw: &str) -> Vec<JobType> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<JobType>() {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!("Ignoring command runner capability: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capabilities() {
        assert_eq!(
            parse_capabilities("export, custom,bogus,"),
            vec![JobType::Export, JobType::Custom]
        );
    }

    #[test]
    fn test_fast_config_has_no_delays() {
        let config = WorkerConfig::fast("/tmp/x");
        assert_eq!(config.step_delay, Duration::ZERO);
        assert_eq!(config.phase_jitter, Duration::ZERO);
        assert!(config.pipeline_command.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(WorkerConfig::default().validate().is_ok());

        let mut config = WorkerConfig::fast("");
        assert!(config.validate().is_err());

        config.work_dir = PathBuf::from("/tmp/darkroom");
        config.pipeline_command = Some("convert".to_string());
        config.command_capabilities.clear();
        assert!(matches!(config.validate(), Err(WorkerError::ConfigError(_))));
    }
}
