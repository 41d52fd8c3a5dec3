use std::mem;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::shared::WorkerShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushReason {
    Size,
    Linger,
    Shutdown,
}

impl FlushReason {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Linger => "linger",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Deadline for a batch whose first item arrived now. Linger times too large
/// to represent as an `Instant` saturate to a deadline decades away.
pub(super) fn linger_deadline(linger_time: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(linger_time)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// One batch/linger loop. Owns its partial batch exclusively; a fresh
/// `Worker` starts from an empty batch with a disarmed linger timer.
pub(crate) struct Worker<T> {
    pub id: usize,
    pub(super) shared: WorkerShared<T>,
    pub(super) shutdown: CancellationToken,
}

impl<T: Send + Sync + 'static> Worker<T> {
    pub(crate) fn new(id: usize, shared: WorkerShared<T>, shutdown: CancellationToken) -> Self {
        Self {
            id,
            shared,
            shutdown,
        }
    }

    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.id))]
    pub(crate) async fn run(self) {
        tracing::debug!(worker = self.id, "worker loop started");

        let batch_size = self.shared.batch_size;
        let linger_time = self.shared.linger_time;
        let mut batch: Vec<T> = Vec::with_capacity(batch_size);
        let linger = time::sleep(linger_time);
        tokio::pin!(linger);
        let mut linger_armed = false;

        loop {
            // Shutdown wins over pending items so a fast stop never claims more
            // work; an expired linger timer wins over a fresh item so the
            // partial batch leaves on time.
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    tracing::debug!(
                        worker = self.id,
                        pending = batch.len(),
                        "shutdown requested; flushing partial batch"
                    );
                    self.flush(&mut batch, FlushReason::Shutdown).await;
                    break;
                }
                _ = &mut linger, if linger_armed => {
                    linger_armed = false;
                    if batch.is_empty() {
                        continue;
                    }
                    self.flush(&mut batch, FlushReason::Linger).await;
                }
                received = self.shared.queue.recv() => {
                    let Some(item) = received else {
                        tracing::debug!(worker = self.id, "queue closed; exiting worker loop");
                        self.flush(&mut batch, FlushReason::Shutdown).await;
                        break;
                    };

                    batch.push(item);
                    if batch.len() < batch_size {
                        if batch.len() == 1 {
                            linger.as_mut().reset(linger_deadline(linger_time));
                            linger_armed = true;
                        }
                        continue;
                    }

                    linger_armed = false;
                    self.flush(&mut batch, FlushReason::Size).await;
                }
            }
        }

        tracing::debug!(worker = self.id, "worker loop exited");
    }

    async fn flush(&self, batch: &mut Vec<T>, reason: FlushReason) {
        if batch.is_empty() {
            return;
        }
        let items = mem::replace(batch, Vec::with_capacity(self.shared.batch_size));
        self.dispatch(items, reason).await;
    }
}
