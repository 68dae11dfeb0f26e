//! Built-in runners.

mod command;
mod inference;
mod output;
mod pipeline;

use std::sync::Arc;

use darkroom_queue::{ProcessingQueue, Runner};

use crate::config::WorkerConfig;

pub use command::{expand_placeholders, parse_progress_line, CommandRunner};
pub use inference::InferenceRunner;
pub use output::{materialize_output, resolve_output_path};
pub use pipeline::PipelineRunner;

/// The runners a default deployment registers, in registration order.
///
/// The command runner is only included when a pipeline command is configured.
pub fn default_runners(config: &WorkerConfig) -> Vec<Arc<dyn Runner>> {
    let mut runners: Vec<Arc<dyn Runner>> = vec![
        Arc::new(InferenceRunner::new(config)),
        Arc::new(PipelineRunner::new(config)),
    ];
    if let Some(command) = CommandRunner::from_config(config) {
        runners.push(Arc::new(command));
    }
    runners
}

/// Register [`default_runners`] on `queue`. Returns how many were added.
pub fn register_default_runners(queue: &ProcessingQueue, config: &WorkerConfig) -> usize {
    let runners = default_runners(config);
    let count = runners.len();
    for runner in runners {
        tracing::info!(
            runner_id = runner.id(),
            capabilities = ?runner.capabilities(),
            "Registering runner"
        );
        queue.add_runner(runner);
    }
    count
}
