use crate::queue::BatchQueue;
use crate::runtime::logger::LogSink;
use crate::runtime::telemetry::{Telemetry, TelemetrySnapshot};
use std::sync::Arc;
use tokio::task::yield_now;

use super::state::{AggregatorState, StateCell};

/// Cloneable producer side of an aggregator.
///
/// Also handed to the [`ErrorHandler`](crate::ErrorHandler) so it can
/// re-enqueue failed items. Enqueue operations never report downstream
/// handler failures.
pub struct AggregatorHandle<T> {
    queue: BatchQueue<T>,
    log: LogSink,
    telemetry: Arc<Telemetry>,
    state: Arc<StateCell>,
}

impl<T> Clone for AggregatorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            log: self.log.clone(),
            telemetry: Arc::clone(&self.telemetry),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> AggregatorHandle<T> {
    /// Fresh handle in the `Created` state with zeroed telemetry.
    pub(crate) fn new(queue: BatchQueue<T>, log: LogSink) -> Self {
        Self {
            queue,
            log,
            telemetry: Arc::new(Telemetry::default()),
            state: Arc::new(StateCell::new()),
        }
    }

    /// Enqueues `item`, waiting for a free slot while the queue is full.
    pub async fn enqueue(&self, item: T) {
        if self.queue.push(item).await.is_ok() {
            self.telemetry.record_enqueued();
        }
    }

    /// Enqueues `item` without waiting for capacity.
    ///
    /// On a full queue this yields to the scheduler once so a worker can claim
    /// a slot, then retries once. Returns `false` if the item had to be dropped.
    pub async fn try_enqueue(&self, item: T) -> bool {
        let item = match self.queue.try_push(item) {
            Ok(()) => {
                self.telemetry.record_enqueued();
                return true;
            }
            Err(item) => item,
        };

        self.log
            .warn(None, format_args!("event queue is full; yielding before retry"));
        yield_now().await;

        match self.queue.try_push(item) {
            Ok(()) => {
                self.telemetry.record_enqueued();
                true
            }
            Err(_) => {
                self.telemetry.record_dropped();
                let dropped = self.telemetry.snapshot().dropped_items;
                self.log.warn(
                    None,
                    format_args!(
                        "event queue is still full ({}/{}); item is skipped (dropped {dropped} so far)",
                        self.queue.len(),
                        self.queue.capacity()
                    ),
                );
                false
            }
        }
    }

    /// Blocking [`enqueue`](Self::enqueue) for producers on plain threads.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context; use
    /// `tokio::task::spawn_blocking` or a dedicated thread.
    pub fn blocking_enqueue(&self, item: T) {
        if self.queue.blocking_push(item).is_ok() {
            self.telemetry.record_enqueued();
        }
    }

    /// Items waiting in the queue that no worker has claimed yet.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn state(&self) -> AggregatorState {
        self.state.get()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub(crate) fn queue(&self) -> &BatchQueue<T> {
        &self.queue
    }

    pub(crate) fn log(&self) -> &LogSink {
        &self.log
    }

    pub(crate) fn telemetry_arc(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub(crate) fn state_cell(&self) -> &StateCell {
        &self.state
    }
}
