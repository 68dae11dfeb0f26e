//! Progress callback handed to runners.

use std::fmt;
use std::sync::Arc;

use darkroom_models::JobId;

/// Clamp a raw percentage into `0..=100`, rounding down.
pub fn clamp_percent(percent: f64) -> u8 {
    if percent.is_nan() {
        return 0;
    }
    percent.clamp(0.0, 100.0).floor() as u8
}

/// Reports job progress back to whoever owns the job.
///
/// Runners only ever see this handle; the job record itself stays with
/// the queue.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    sink: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressReporter {
    /// Reporter forwarding clamped values to `sink`.
    pub fn new(job_id: JobId, sink: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            job_id,
            sink: Arc::new(sink),
        }
    }

    /// Reporter that discards every update.
    pub fn noop(job_id: JobId) -> Self {
        Self::new(job_id, |_| {})
    }

    /// Report a percentage. Values outside `0..=100` are clamped.
    pub fn report(&self, percent: f64) {
        (self.sink)(clamp_percent(percent));
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}
