//! Progress reporting and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(BatchProgress) + Send + Sync>;

/// Batch progress information.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Addresses that need a remote lookup
    pub total: u64,
    /// Lookups finished so far
    pub completed: u64,
    /// Finished lookups that stored the fallback
    pub fallbacks: u64,
    /// Current rate (lookups per second)
    pub rate: f64,
    /// Estimated time remaining in seconds
    pub eta_seconds: Option<f64>,
    /// Percentage complete (0-100)
    pub percent: f64,
}

impl BatchProgress {
    /// Creates a new progress tracker.
    pub fn new(total: u64) -> Self {
        Self {
            total,
            completed: 0,
            fallbacks: 0,
            rate: 0.0,
            eta_seconds: None,
            percent: 0.0,
        }
    }

    /// Updates progress with new values.
    pub fn update(&mut self, completed: u64, fallbacks: u64, elapsed_ms: u64) {
        self.completed = completed;
        self.fallbacks = fallbacks;

        if elapsed_ms > 0 {
            self.rate = (completed as f64 / elapsed_ms as f64) * 1000.0;
        }

        if self.total > 0 {
            self.percent = (completed as f64 / self.total as f64) * 100.0;

            if self.rate > 0.0 {
                let remaining = self.total.saturating_sub(completed);
                self.eta_seconds = Some(remaining as f64 / self.rate);
            }
        } else {
            self.percent = 100.0;
        }
    }

    /// Returns true once every lookup has finished.
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative stop signal for a running batch.
///
/// Cancelling stops further submissions. Lookups already in flight finish
/// and their results are saved. A request made between runs applies to the
/// next run; the orchestrator clears it when that run ends.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Creates a handle that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Clears a previous request.
    pub fn reset(&self) {
        self.state.cancelled.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_progress_update() {
        let mut progress = BatchProgress::new(200);
        progress.update(50, 5, 10_000);

        assert_eq!(progress.percent, 25.0);
        assert_eq!(progress.rate, 5.0);
        assert_eq!(progress.eta_seconds, Some(30.0));
        assert!(!progress.is_complete());

        progress.update(200, 5, 40_000);
        assert!(progress.is_complete());
        assert_eq!(progress.eta_seconds, Some(0.0));
    }

    #[test]
    fn test_progress_empty_batch() {
        let mut progress = BatchProgress::new(0);
        progress.update(0, 0, 0);
        assert_eq!(progress.percent, 100.0);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_cancel_handle_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_reset_clears_request() {
        let handle = CancelHandle::new();
        handle.cancel();
        handle.clone().reset();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let handle = CancelHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let handle = CancelHandle::new();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle.cancelled())
            .await
            .unwrap();
    }
}
