use crate::aggregator::AggregatorHandle;
use crate::queue::BatchQueue;
use crate::runtime::handler::{BatchHandler, ErrorHandler};
use crate::runtime::logger::LogSink;
use crate::runtime::telemetry::Telemetry;
use crate::tracker::InFlightTracker;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct WorkerShared<T> {
    pub(super) queue: BatchQueue<T>,
    pub(super) handler: Arc<dyn BatchHandler<T>>,
    pub(super) error_handler: Option<Arc<dyn ErrorHandler<T>>>,
    pub(super) log: LogSink,
    pub(super) telemetry: Arc<Telemetry>,
    pub(super) tracker: Arc<InFlightTracker>,
    pub(super) handle: AggregatorHandle<T>,
    pub(super) batch_size: usize,
    pub(super) linger_time: Duration,
}

pub(crate) struct WorkerSharedParams<T> {
    pub handler: Arc<dyn BatchHandler<T>>,
    pub error_handler: Option<Arc<dyn ErrorHandler<T>>>,
    pub tracker: Arc<InFlightTracker>,
    pub handle: AggregatorHandle<T>,
    pub batch_size: usize,
    pub linger_time: Duration,
}

impl<T> WorkerShared<T> {
    /// Queue, log sink and telemetry come from the handle so producers and
    /// workers always observe the same instances.
    pub(crate) fn new(params: WorkerSharedParams<T>) -> Self {
        let WorkerSharedParams {
            handler,
            error_handler,
            tracker,
            handle,
            batch_size,
            linger_time,
        } = params;

        Self {
            queue: handle.queue().clone(),
            log: handle.log().clone(),
            telemetry: handle.telemetry_arc(),
            handler,
            error_handler,
            tracker,
            handle,
            batch_size,
            linger_time,
        }
    }

    pub(crate) fn tracker(&self) -> &Arc<InFlightTracker> {
        &self.tracker
    }
}

impl<T> Clone for WorkerShared<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            handler: Arc::clone(&self.handler),
            error_handler: self.error_handler.clone(),
            log: self.log.clone(),
            telemetry: Arc::clone(&self.telemetry),
            tracker: Arc::clone(&self.tracker),
            handle: self.handle.clone(),
            batch_size: self.batch_size,
            linger_time: self.linger_time,
        }
    }
}
