use crate::aggregator::AggregatorHandle;
use anyhow::{Error as AnyError, Result};
use core::future::Future;
use core::pin::Pin;
use std::sync::Arc;

/// Items flushed together by one worker. Shared so the exact same batch can be
/// handed to the [`ErrorHandler`] after a failed dispatch.
pub type Batch<T> = Arc<[T]>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;
pub type ErrorHandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Consumer of flushed batches, typically a bulk write or a network flush.
///
/// Workers await the returned future before reading more items, so a slow
/// handler back-pressures only the worker that called it.
pub trait BatchHandler<T>: Send + Sync + 'static {
    fn handle(&self, batch: Batch<T>) -> HandlerFuture;
}

impl<T, F, Fut> BatchHandler<T> for F
where
    F: Fn(Batch<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle(&self, batch: Batch<T>) -> HandlerFuture {
        Box::pin(self(batch))
    }
}

/// Remediation hook run when a [`BatchHandler`] reports failure.
///
/// Invoked on a detached task, never on the worker itself. It receives the
/// failed batch, the error, the handler (so it can retry) and a producer handle
/// (so it can re-enqueue or inspect the queue). Shutdown waits for it to finish.
pub trait ErrorHandler<T>: Send + Sync + 'static {
    fn handle_error(
        &self,
        error: AnyError,
        batch: Batch<T>,
        handler: Arc<dyn BatchHandler<T>>,
        aggregator: AggregatorHandle<T>,
    ) -> ErrorHandlerFuture;
}

impl<T, F, Fut> ErrorHandler<T> for F
where
    F: Fn(AnyError, Batch<T>, Arc<dyn BatchHandler<T>>, AggregatorHandle<T>) -> Fut
        + Send
        + Sync
        + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle_error(
        &self,
        error: AnyError,
        batch: Batch<T>,
        handler: Arc<dyn BatchHandler<T>>,
        aggregator: AggregatorHandle<T>,
    ) -> ErrorHandlerFuture {
        Box::pin(self(error, batch, handler, aggregator))
    }
}
