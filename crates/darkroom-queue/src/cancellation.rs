//! One-way cancellation latch handed to runners.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Reason recorded when a caller cancels a job.
pub const REASON_USER_CANCELLED: &str = "user_cancelled";
/// Reason recorded when the queue shuts down.
pub const REASON_SHUTDOWN: &str = "shutdown";

/// Cooperative cancellation signal with an optional reason.
///
/// Starts uncancelled and transitions at most once. Clones share state, so
/// the queue keeps one handle and the runner observes another. Only the
/// cancel that flips the token records its reason; later cancels are no-ops.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
    reason: Arc<OnceLock<String>>,
    /// Serializes the flip so the reason belongs to the winning cancel
    flip: Arc<Mutex<()>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel without a reason.
    pub fn cancel(&self) {
        let _flip = self.flip.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.cancel();
    }

    /// Cancel and record `reason` if this is the first cancel.
    pub fn cancel_with_reason(&self, reason: impl Into<String>) {
        let _flip = self.flip.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.is_cancelled() {
            return;
        }
        let _ = self.reason.set(reason.into());
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Reason given by the first cancel, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }
}
