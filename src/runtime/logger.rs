//! Leveled logging capability handed to an aggregator.
//!
//! The engine reports queue pressure, dispatch outcomes and worker faults
//! through this trait rather than straight to `tracing`, so callers can route
//! them into their own logging facade.

use anyhow::Error as AnyError;
use std::fmt;
use std::sync::Arc;

/// Component tag the aggregator attaches to every record it emits.
pub const AGGREGATOR_COMPONENT: &str = "Aggregator";

pub trait Logger: Send + Sync + 'static {
    fn info(&self, component: &str, message: fmt::Arguments<'_>);

    fn warn(&self, component: &str, error: Option<&AnyError>, message: fmt::Arguments<'_>);

    fn error(&self, component: &str, error: Option<&AnyError>, message: fmt::Arguments<'_>);
}

/// [`Logger`] that forwards every record to `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, component: &str, message: fmt::Arguments<'_>) {
        tracing::info!(target: "batchline::aggregator", component, "{message}");
    }

    fn warn(&self, component: &str, error: Option<&AnyError>, message: fmt::Arguments<'_>) {
        match error {
            Some(error) => tracing::warn!(
                target: "batchline::aggregator",
                component,
                error = %error,
                "{message}"
            ),
            None => tracing::warn!(target: "batchline::aggregator", component, "{message}"),
        }
    }

    fn error(&self, component: &str, error: Option<&AnyError>, message: fmt::Arguments<'_>) {
        match error {
            Some(error) => tracing::error!(
                target: "batchline::aggregator",
                component,
                error = %error,
                "{message}"
            ),
            None => tracing::error!(target: "batchline::aggregator", component, "{message}"),
        }
    }
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
    fn info(&self, component: &str, message: fmt::Arguments<'_>) {
        (**self).info(component, message)
    }

    fn warn(&self, component: &str, error: Option<&AnyError>, message: fmt::Arguments<'_>) {
        (**self).warn(component, error, message)
    }

    fn error(&self, component: &str, error: Option<&AnyError>, message: fmt::Arguments<'_>) {
        (**self).error(component, error, message)
    }
}

/// Optional logger as seen by the engine: every call is a no-op when no
/// logger was configured.
#[derive(Clone, Default)]
pub(crate) struct LogSink {
    logger: Option<Arc<dyn Logger>>,
}

impl LogSink {
    pub(crate) fn new(logger: Option<Arc<dyn Logger>>) -> Self {
        Self { logger }
    }

    pub(crate) fn info(&self, message: fmt::Arguments<'_>) {
        if let Some(logger) = &self.logger {
            logger.info(AGGREGATOR_COMPONENT, message);
        }
    }

    pub(crate) fn warn(&self, error: Option<&AnyError>, message: fmt::Arguments<'_>) {
        if let Some(logger) = &self.logger {
            logger.warn(AGGREGATOR_COMPONENT, error, message);
        }
    }

    pub(crate) fn error(&self, error: Option<&AnyError>, message: fmt::Arguments<'_>) {
        if let Some(logger) = &self.logger {
            logger.error(AGGREGATOR_COMPONENT, error, message);
        }
    }
}
