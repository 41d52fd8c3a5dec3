use crate::runtime::handler::Batch;
use std::sync::Arc;

use super::process::{FlushReason, Worker};

impl<T: Send + Sync + 'static> Worker<T> {
    /// Hands a non-empty batch to the handler and waits for it.
    ///
    /// On failure the error handler, if any, runs on a detached task that holds
    /// its own in-flight guard; otherwise the batch is dropped.
    pub(super) async fn dispatch(&self, items: Vec<T>, reason: FlushReason) {
        let shared = &self.shared;
        let _in_flight = shared.tracker.enter();

        let batch: Batch<T> = Arc::from(items);
        let len = batch.len();
        shared.telemetry.record_dispatched(len);
        if reason == FlushReason::Linger {
            shared.telemetry.record_linger_flush();
        }
        tracing::debug!(
            worker = self.id,
            items = len,
            reason = reason.as_str(),
            "dispatching batch"
        );

        let error = match shared.handler.handle(Arc::clone(&batch)).await {
            Ok(()) => {
                shared
                    .log
                    .info(format_args!("{len} items have been sent."));
                return;
            }
            Err(error) => error,
        };

        shared.telemetry.record_failed_batch();
        shared
            .log
            .error(Some(&error), format_args!("batch handler failed on {len} items"));

        let Some(error_handler) = shared.error_handler.clone() else {
            shared.log.error(
                Some(&error),
                format_args!("no error handler configured; {len} items are skipped"),
            );
            return;
        };

        let guard = shared.tracker.enter();
        let handler = Arc::clone(&shared.handler);
        let handle = shared.handle.clone();
        let worker = self.id;
        tokio::spawn(async move {
            let _guard = guard;
            tracing::debug!(worker, items = len, "running error handler");
            error_handler
                .handle_error(error, batch, handler, handle)
                .await;
        });
    }
}
