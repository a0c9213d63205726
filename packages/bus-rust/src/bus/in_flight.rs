//! In-flight tracking for asynchronous dispatches.
//!
//! Every spawned dispatch task holds an [`InFlightGuard`]; the counter drops
//! back when the task finishes, fails, or panics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared counter of running asynchronous dispatch tasks.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    in_flight: Arc<AtomicU64>,
}

impl InFlightTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an RAII guard that counts one in-flight task until dropped.
    #[must_use]
    pub fn guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits until no task is in flight, up to `timeout`.
    ///
    /// Returns `true` if the count reached zero before the deadline.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.count() == 0 {
                return true;
            }

            if tokio::time::Instant::now() >= deadline {
                return false;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Decrements the in-flight counter when dropped, including during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_increments_and_decrements() {
        let tracker = InFlightTracker::new();
        assert_eq!(tracker.count(), 0);

        let g1 = tracker.guard();
        let g2 = tracker.clone().guard();
        assert_eq!(tracker.count(), 2);

        drop(g1);
        assert_eq!(tracker.count(), 1);
        drop(g2);
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn wait_for_idle_immediate() {
        let tracker = InFlightTracker::new();
        assert!(tracker.wait_for_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn wait_for_idle_after_guard_released() {
        let tracker = InFlightTracker::new();
        let guard = tracker.guard();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert!(tracker.wait_for_idle(Duration::from_secs(2)).await);
        release.await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_idle_times_out() {
        let tracker = InFlightTracker::new();
        let _guard = tracker.guard();
        assert!(!tracker.wait_for_idle(Duration::from_millis(50)).await);
        assert_eq!(tracker.count(), 1);
    }
}
