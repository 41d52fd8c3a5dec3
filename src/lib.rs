//! In-process batching: producers submit items one at a time and a pool of
//! workers hands them to a batch handler in groups bounded by count or by
//! linger time.

pub mod aggregator;
pub mod queue;
pub mod runtime;
pub mod tracker;
mod worker;

pub use aggregator::{Aggregator, AggregatorBuilder, AggregatorHandle, AggregatorState};
pub use queue::BatchQueue;
pub use runtime::config::{AggregatorConfig, AggregatorConfigBuilder, AggregatorConfigParams};
pub use runtime::handler::{
    Batch, BatchHandler, ErrorHandler, ErrorHandlerFuture, HandlerFuture,
};
pub use runtime::logger::{Logger, TracingLogger, AGGREGATOR_COMPONENT};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
