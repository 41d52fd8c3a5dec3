use crate::queue::BatchQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const METRICS_TARGET: &str = "batchline::metrics";

static SUBSCRIBER: OnceLock<()> = OnceLock::new();

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if this function already ran or another global subscriber is
/// installed.
pub fn init_tracing() {
    SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

/// Rolling counters describing what an aggregator has done so far.
#[derive(Default, Debug)]
pub struct Telemetry {
    enqueued_items: AtomicU64,
    dropped_items: AtomicU64,
    dispatched_batches: AtomicU64,
    dispatched_items: AtomicU64,
    failed_batches: AtomicU64,
    linger_flushes: AtomicU64,
    worker_restarts: AtomicU64,
}

impl Telemetry {
    pub fn record_enqueued(&self) {
        self.enqueued_items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, items: usize) {
        self.dispatched_batches.fetch_add(1, Ordering::Relaxed);
        self.dispatched_items
            .fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_failed_batch(&self) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_linger_flush(&self) {
        self.linger_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_restart(&self) {
        self.worker_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            enqueued_items: self.enqueued_items.load(Ordering::Relaxed),
            dropped_items: self.dropped_items.load(Ordering::Relaxed),
            dispatched_batches: self.dispatched_batches.load(Ordering::Relaxed),
            dispatched_items: self.dispatched_items.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            linger_flushes: self.linger_flushes.load(Ordering::Relaxed),
            worker_restarts: self.worker_restarts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub enqueued_items: u64,
    pub dropped_items: u64,
    pub dispatched_batches: u64,
    pub dispatched_items: u64,
    pub failed_batches: u64,
    pub linger_flushes: u64,
    pub worker_restarts: u64,
}

/// Spawns a task that logs a [`TelemetrySnapshot`] and the queue depth every
/// `interval` until `shutdown` is cancelled. The first report comes one
/// interval after start.
pub fn spawn_metrics_reporter<T: Send + 'static>(
    telemetry: Arc<Telemetry>,
    queue: BatchQueue<T>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    let mut reporter = MetricsReporter {
        previous: telemetry.snapshot(),
        since: Instant::now(),
        telemetry,
    };

    tokio::spawn(async move {
        let mut ticks = time::interval_at(Instant::now() + interval, interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while shutdown
            .run_until_cancelled(ticks.tick())
            .await
            .is_some()
        {
            reporter.report(queue.len());
        }
        tracing::debug!(target: METRICS_TARGET, "metrics reporter stopped");
    })
}

struct MetricsReporter {
    telemetry: Arc<Telemetry>,
    previous: TelemetrySnapshot,
    since: Instant,
}

impl MetricsReporter {
    fn report(&mut self, queue_len: usize) {
        let current = self.telemetry.snapshot();
        let window = self.since.elapsed().as_secs_f64();
        let items_per_sec = per_second(
            current.dispatched_items - self.previous.dispatched_items,
            window,
        );
        let batches_per_sec = per_second(
            current.dispatched_batches - self.previous.dispatched_batches,
            window,
        );

        tracing::info!(
            target: METRICS_TARGET,
            items_per_sec = format!("{items_per_sec:.2}"),
            batches_per_sec = format!("{batches_per_sec:.2}"),
            enqueued = current.enqueued_items,
            dropped = current.dropped_items,
            failed_batches = current.failed_batches,
            linger_flushes = current.linger_flushes,
            worker_restarts = current.worker_restarts,
            queue_len,
            "aggregator metrics"
        );

        self.previous = current;
        self.since = Instant::now();
    }
}

fn per_second(count: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        count as f64 / seconds
    } else {
        0.0
    }
}
