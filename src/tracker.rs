//! Completion counter that shutdown waits on.
//!
//! Worker supervisors, batch dispatches and spawned error-handler tasks each
//! hold an [`InFlightGuard`] for as long as they run. Shutdown returns only
//! once the count drops back to zero.

use std::sync::Arc;
use tokio::sync::watch;

/// Number of live [`InFlightGuard`]s, published through a `watch` channel so
/// waiters observe every transition to zero.
#[derive(Debug)]
pub struct InFlightTracker {
    count: watch::Sender<usize>,
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Registers one unit of outstanding work. Released when the guard drops,
    /// including during unwinding.
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.send_modify(|count| *count += 1);
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolves once no guard is alive. Work registered after that point is
    /// not waited for.
    pub async fn wait_until_idle(&self) {
        let mut idle = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = idle.wait_for(|count| *count == 0).await;
    }
}

#[must_use = "work is only tracked while the guard is alive"]
pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker
            .count
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}
