use crate::runtime::telemetry::TelemetrySnapshot;
use tokio::time::sleep;

use super::{Aggregator, AggregatorState};

impl<T: Send + Sync + 'static> Aggregator<T> {
    /// Fast stop: signals every worker at once.
    ///
    /// Each worker flushes only the batch it is currently holding; items still
    /// sitting in the queue are abandoned. Returns once every worker has exited
    /// and every in-flight dispatch and error-handler task has finished.
    pub async fn stop(mut self) -> TelemetrySnapshot {
        self.shutdown_and_wait().await
    }

    /// Drain-safe stop: waits until the queue is observed empty, then stops
    /// like [`stop`](Self::stop).
    ///
    /// Every item enqueued before this call is dispatched. Items enqueued
    /// concurrently may or may not be; stop producing before calling it.
    pub async fn safe_stop(mut self) -> TelemetrySnapshot {
        if self.workers.is_empty() {
            if !self.handle.queue().is_empty() {
                tracing::warn!(
                    queued = self.handle.queue_len(),
                    "aggregator was never started; queued items cannot drain"
                );
            }
        } else {
            self.wait_for_drain().await;
        }

        self.shutdown_and_wait().await
    }

    async fn wait_for_drain(&self) {
        let poll_interval = self.config.drain_poll_interval();
        let mut polls = 0u64;
        while !self.handle.queue().is_empty() {
            polls += 1;
            tracing::trace!(
                queued = self.handle.queue_len(),
                polls,
                "waiting for queue to drain before shutdown"
            );
            sleep(poll_interval).await;
        }
        tracing::debug!(polls, "queue drained; signalling shutdown");
    }

    async fn shutdown_and_wait(&mut self) -> TelemetrySnapshot {
        self.handle.state_cell().advance(AggregatorState::Stopping);
        self.shutdown.cancel();

        self.tracker.wait_until_idle().await;

        for (worker_id, handle) in self.workers.drain(..).enumerate() {
            if let Err(err) = handle.await {
                tracing::warn!(
                    worker = worker_id,
                    error = %err,
                    "worker supervisor task failed"
                );
            }
        }

        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }

        self.handle.state_cell().advance(AggregatorState::Stopped);
        let snapshot = self.handle.telemetry();
        tracing::info!(
            dispatched_batches = snapshot.dispatched_batches,
            dispatched_items = snapshot.dispatched_items,
            abandoned = self.handle.queue_len(),
            "aggregator stopped"
        );
        snapshot
    }
}
