//! Simulated bulk writer: several producers push events one at a time while
//! the aggregator groups them into bulk writes against a fake sink.
//!
//! Aggregator settings come from `BATCHLINE_*` variables; the demo itself reads
//! `BULK_WRITER_EVENTS`, `BULK_WRITER_PRODUCERS`, `BULK_WRITER_WRITE_MS` and
//! `BULK_WRITER_FAIL_EVERY`.

use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Context, Error as AnyError, Result};
use batchline::{
    Aggregator, AggregatorConfig, AggregatorHandle, Batch, BatchHandler, HandlerFuture,
    TracingLogger,
};
use tokio::time::sleep;

const DEFAULT_EVENTS: u64 = 10_000;
const DEFAULT_PRODUCERS: usize = 4;
const DEFAULT_WRITE_MS: u64 = 5;
const DEFAULT_FAIL_EVERY: u64 = 0;
const DEFAULT_LOG_DIRECTIVE: &str = "info";

#[derive(Debug, Clone)]
struct Event {
    id: u64,
    producer: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_demo_tracing();

    let args = DemoArgs::from_env()?;
    let config = AggregatorConfig::from_env()?;
    println!(
        "Writing {} events from {} producers (batch size {}, {} workers)",
        args.events,
        args.producers,
        config.batch_size(),
        config.workers()
    );

    let stats = Arc::new(SinkStats::default());
    let sink = FakeSink {
        latency: args.write_latency,
        fail_every: args.fail_every,
        stats: Arc::clone(&stats),
    };
    let mut aggregator = Aggregator::builder(sink)
        .config(config)
        .error_handler(retry_once)
        .logger(TracingLogger)
        .build();
    aggregator.start()?;

    let started = Instant::now();
    let per_producer = args.events / args.producers as u64;
    let producers: Vec<_> = (0..args.producers)
        .map(|producer| {
            let handle = aggregator.handle();
            tokio::spawn(async move {
                let first = producer as u64 * per_producer;
                for id in first..first + per_producer {
                    handle.enqueue(Event { id, producer }).await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.context("producer task failed")?;
    }

    let snapshot = aggregator.safe_stop().await;
    let seconds = started.elapsed().as_secs_f64();
    let written = stats.written.load(Ordering::Relaxed);
    println!(
        "Wrote {written} events in {} bulk writes over {seconds:.2}s [{:.0} events/s]",
        stats.writes.load(Ordering::Relaxed),
        if seconds > 0.0 {
            written as f64 / seconds
        } else {
            0.0
        }
    );
    println!(
        "{} batches failed on first attempt, {} linger flushes",
        snapshot.failed_batches, snapshot.linger_flushes
    );
    Ok(())
}

fn init_demo_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    batchline::init_tracing();
}

/// Stands in for a database bulk insert. Every `fail_every`-th write fails.
struct FakeSink {
    latency: Duration,
    fail_every: u64,
    stats: Arc<SinkStats>,
}

#[derive(Default)]
struct SinkStats {
    attempts: AtomicU64,
    writes: AtomicU64,
    written: AtomicU64,
}

impl BatchHandler<Event> for FakeSink {
    fn handle(&self, batch: Batch<Event>) -> HandlerFuture {
        let stats = Arc::clone(&self.stats);
        let latency = self.latency;
        let fail_every = self.fail_every;
        Box::pin(async move {
            let attempt = stats.attempts.fetch_add(1, Ordering::Relaxed) + 1;
            sleep(latency).await;
            if fail_every > 0 && attempt % fail_every == 0 {
                let first = batch.first().map(|event| (event.id, event.producer));
                bail!("bulk insert rejected at attempt {attempt} (first event {first:?})");
            }
            stats.writes.fetch_add(1, Ordering::Relaxed);
            stats.written.fetch_add(batch.len() as u64, Ordering::Relaxed);
            Ok(())
        })
    }
}

async fn retry_once(
    error: AnyError,
    batch: Batch<Event>,
    handler: Arc<dyn BatchHandler<Event>>,
    _aggregator: AggregatorHandle<Event>,
) {
    tracing::warn!(error = %error, items = batch.len(), "retrying failed bulk write");
    if let Err(error) = handler.handle(batch).await {
        tracing::error!(error = %error, "retry failed; events are lost");
    }
}

struct DemoArgs {
    events: u64,
    producers: usize,
    write_latency: Duration,
    fail_every: u64,
}

impl DemoArgs {
    fn from_env() -> Result<Self> {
        let events = parse_env_with_default("BULK_WRITER_EVENTS", DEFAULT_EVENTS)?;
        let producers = parse_env_with_default("BULK_WRITER_PRODUCERS", DEFAULT_PRODUCERS)?;
        let write_ms = parse_env_with_default("BULK_WRITER_WRITE_MS", DEFAULT_WRITE_MS)?;
        let fail_every = parse_env_with_default("BULK_WRITER_FAIL_EVERY", DEFAULT_FAIL_EVERY)?;

        ensure!(producers > 0, "BULK_WRITER_PRODUCERS must be greater than 0");
        ensure!(
            events >= producers as u64,
            "BULK_WRITER_EVENTS must be at least BULK_WRITER_PRODUCERS"
        );

        Ok(Self {
            events,
            producers,
            write_latency: Duration::from_millis(write_ms),
            fail_every,
        })
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid value, got {value:?}")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
