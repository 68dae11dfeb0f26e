//! Application state.

use std::sync::Arc;

use darkroom_queue::{ProcessingQueue, QueueConfig};
use darkroom_storage::PresetManager;
use darkroom_worker::{register_default_runners, WorkerConfig, WorkerError};

use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::history::{spawn_history_recorder, JobHistory};
use crate::metrics::spawn_queue_metrics;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: ProcessingQueue,
    pub presets: Arc<PresetManager>,
    pub history: Arc<JobHistory>,
}

impl AppState {
    /// Wire state around an existing queue and preset store.
    ///
    /// Starts the history recorder and queue metrics tasks, so this must be
    /// called inside a Tokio runtime.
    pub fn new(config: ApiConfig, queue: ProcessingQueue, presets: PresetManager) -> Self {
        let history = Arc::new(JobHistory::new(config.history_limit));
        spawn_history_recorder(Arc::clone(&history), queue.subscribe());
        spawn_queue_metrics(queue.clone());

        Self {
            config,
            queue,
            presets: Arc::new(presets),
            history,
        }
    }

    /// Build the queue, built-in runners and preset store from the environment.
    pub async fn from_env(config: ApiConfig) -> ApiResult<Self> {
        let worker_config = WorkerConfig::from_env();
        worker_config.validate()?;
        tokio::fs::create_dir_all(&worker_config.work_dir)
            .await
            .map_err(WorkerError::from)?;

        let queue = ProcessingQueue::new(QueueConfig::from_env());
        let presets = match &config.presets_path {
            Some(path) => PresetManager::new(path),
            None => PresetManager::from_env()?,
        };

        let state = Self::new(config, queue, presets);
        let runners = register_default_runners(&state.queue, &worker_config);
        tracing::info!(
            runners,
            presets_path = %state.presets.path().display(),
            "Application state ready"
        );
        Ok(state)
    }
}
