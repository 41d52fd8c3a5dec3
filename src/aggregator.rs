//! The aggregator engine: construction, worker start-up and the public
//! producer/shutdown surface.
//!
//! Submodules:
//! - `handle`: cloneable producer handle
//! - `state`: one-way lifecycle state
//! - `shutdown`: fast and drain-safe stop protocols

mod handle;
mod shutdown;
mod state;

pub use handle::AggregatorHandle;
pub use state::AggregatorState;

use crate::queue::BatchQueue;
use crate::runtime::config::AggregatorConfig;
use crate::runtime::handler::{BatchHandler, ErrorHandler};
use crate::runtime::logger::{LogSink, Logger};
use crate::runtime::telemetry::{self, Telemetry, TelemetrySnapshot};
use crate::tracker::InFlightTracker;
use crate::worker::{spawn_supervised, WorkerShared, WorkerSharedParams};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Groups items submitted one at a time into batches for a [`BatchHandler`].
///
/// Items are flushed when a worker's batch reaches `batch_size`, when
/// `linger_time` elapses after the batch's first item, or on shutdown.
/// Shutdown is single-shot: [`stop`](Self::stop) and
/// [`safe_stop`](Self::safe_stop) consume the aggregator.
///
/// Dropping an aggregator without stopping it signals its workers to flush
/// and exit but does not wait for them.
pub struct Aggregator<T: Send + Sync + 'static> {
    config: AggregatorConfig,
    handle: AggregatorHandle<T>,
    shared: WorkerShared<T>,
    tracker: Arc<InFlightTracker>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    metrics_handle: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> Aggregator<T> {
    /// Aggregator with the given configuration and no error handler or logger.
    pub fn new(config: AggregatorConfig, handler: impl BatchHandler<T>) -> Self {
        Self::builder(handler).config(config).build()
    }

    pub fn builder(handler: impl BatchHandler<T>) -> AggregatorBuilder<T> {
        AggregatorBuilder {
            handler: Arc::new(handler),
            config: None,
            error_handler: None,
            logger: None,
        }
    }

    /// Launches one supervised worker task per configured pool slot.
    ///
    /// Must be called from within a Tokio runtime, and only once.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.state() != AggregatorState::Created {
            bail!("aggregator has already been started");
        }
        tokio::runtime::Handle::try_current()
            .context("aggregator must be started from within a Tokio runtime")?;

        for worker_id in 0..self.config.workers() {
            let handle = spawn_supervised(worker_id, self.shared.clone(), self.shutdown.clone());
            self.workers.push(handle);
        }

        if let Some(interval) = self.config.metrics_interval() {
            self.metrics_handle = Some(telemetry::spawn_metrics_reporter(
                self.shared_telemetry(),
                self.handle.queue().clone(),
                self.shutdown.clone(),
                interval,
            ));
        }

        self.handle.state_cell().advance(AggregatorState::Running);
        tracing::info!(
            workers = self.config.workers(),
            batch_size = self.config.batch_size(),
            queue_capacity = self.config.queue_capacity(),
            linger_ms = self.config.linger_time().as_millis() as u64,
            "aggregator started"
        );
        Ok(())
    }

    pub async fn enqueue(&self, item: T) {
        self.handle.enqueue(item).await;
    }

    pub async fn try_enqueue(&self, item: T) -> bool {
        self.handle.try_enqueue(item).await
    }

    /// Producer handle that outlives borrows of the aggregator itself.
    pub fn handle(&self) -> AggregatorHandle<T> {
        self.handle.clone()
    }

    /// Token cancelled as soon as shutdown begins.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn state(&self) -> AggregatorState {
        self.handle.state()
    }

    pub fn queue_len(&self) -> usize {
        self.handle.queue_len()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.handle.telemetry()
    }

    fn shared_telemetry(&self) -> Arc<Telemetry> {
        self.handle.telemetry_arc()
    }
}

impl<T: Send + Sync + 'static> Drop for Aggregator<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub struct AggregatorBuilder<T> {
    handler: Arc<dyn BatchHandler<T>>,
    config: Option<AggregatorConfig>,
    error_handler: Option<Arc<dyn ErrorHandler<T>>>,
    logger: Option<Arc<dyn Logger>>,
}

impl<T: Send + Sync + 'static> AggregatorBuilder<T> {
    /// Defaults to [`AggregatorConfig::default`] when not set.
    pub fn config(mut self, config: AggregatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn error_handler(mut self, error_handler: impl ErrorHandler<T>) -> Self {
        self.error_handler = Some(Arc::new(error_handler));
        self
    }

    pub fn logger(mut self, logger: impl Logger) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    pub fn build(self) -> Aggregator<T> {
        let config = self.config.unwrap_or_default();
        let queue = BatchQueue::with_capacity(config.queue_capacity());
        let handle = AggregatorHandle::new(queue, LogSink::new(self.logger));
        let tracker = Arc::new(InFlightTracker::new());
        let shared = WorkerShared::new(WorkerSharedParams {
            handler: self.handler,
            error_handler: self.error_handler,
            tracker: Arc::clone(&tracker),
            handle: handle.clone(),
            batch_size: config.batch_size(),
            linger_time: config.linger_time(),
        });

        Aggregator {
            config,
            handle,
            shared,
            tracker,
            shutdown: CancellationToken::new(),
            workers: Vec::new(),
            metrics_handle: None,
        }
    }
}
