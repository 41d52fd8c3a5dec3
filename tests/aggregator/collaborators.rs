use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::support::helpers::{init_tracing, wait_for_batches, RecordingHandler};
use anyhow::{anyhow, Context, Error as AnyError, Result};
use batchline::{
    Aggregator, AggregatorConfig, AggregatorHandle, Batch, BatchHandler, Logger, TracingLogger,
    AGGREGATOR_COMPONENT,
};
use tokio::time::{sleep, timeout};

type Failure = (String, Batch<u64>);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_handler_receives_the_failed_batch_once() -> Result<()> {
    init_tracing();
    let attempts: Arc<Mutex<Vec<Batch<u64>>>> = Arc::default();
    let failures: Arc<Mutex<Vec<Failure>>> = Arc::default();

    let handler = {
        let attempts = attempts.clone();
        move |batch: Batch<u64>| {
            attempts.lock().unwrap().push(batch);
            async { Err::<(), _>(anyhow!("bulk insert rejected")) }
        }
    };
    let error_handler = {
        let failures = failures.clone();
        move |error: AnyError,
              batch: Batch<u64>,
              _handler: Arc<dyn BatchHandler<u64>>,
              _aggregator: AggregatorHandle<u64>| {
            let failures = failures.clone();
            async move {
                failures.lock().unwrap().push((error.to_string(), batch));
            }
        }
    };

    let config = AggregatorConfig::builder()
        .batch_size(3)
        .workers(1)
        .build()?;
    let mut aggregator = Aggregator::<u64>::builder(handler)
        .config(config)
        .error_handler(error_handler)
        .build();
    aggregator.start()?;

    for item in 1..=3 {
        aggregator.enqueue(item).await;
    }
    let snapshot = aggregator.safe_stop().await;

    let attempts = attempts.lock().unwrap();
    let failures = failures.lock().unwrap();
    assert_eq!(attempts.len(), 1, "failed batches are never re-dispatched");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "bulk insert rejected");
    assert_eq!(&*failures[0].1, &[1, 2, 3]);
    assert!(Arc::ptr_eq(&attempts[0], &failures[0].1));
    assert_eq!(snapshot.failed_batches, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_handler_can_retry_through_the_handler() -> Result<()> {
    init_tracing();
    let (recording, recorded) = RecordingHandler::new();
    let failed_once = Arc::new(AtomicBool::new(false));
    let handler = {
        let failed_once = failed_once.clone();
        move |batch: Batch<u64>| {
            let first_call = !failed_once.swap(true, Ordering::SeqCst);
            let write = recording.handle(batch);
            async move {
                if first_call {
                    return Err(anyhow!("connection reset"));
                }
                write.await
            }
        }
    };
    let retry = |_error: AnyError,
                 batch: Batch<u64>,
                 handler: Arc<dyn BatchHandler<u64>>,
                 _aggregator: AggregatorHandle<u64>| async move {
        if let Err(error) = handler.handle(batch).await {
            tracing::warn!(error = %error, "retry failed");
        }
    };

    let config = AggregatorConfig::builder()
        .batch_size(2)
        .workers(1)
        .build()?;
    let mut aggregator = Aggregator::<u64>::builder(handler)
        .config(config)
        .error_handler(retry)
        .build();
    aggregator.start()?;

    aggregator.enqueue(1).await;
    aggregator.enqueue(2).await;
    aggregator.safe_stop().await;

    assert_eq!(recorded.batches(), vec![vec![1, 2]]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_handler_can_reenqueue_failed_items() -> Result<()> {
    init_tracing();
    let (recording, recorded) = RecordingHandler::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = {
        let calls = calls.clone();
        move |batch: Batch<u64>| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            let write = recording.handle(batch);
            async move {
                if call == 0 {
                    return Err(anyhow!("partition unavailable"));
                }
                write.await
            }
        }
    };
    let requeue = |_error: AnyError,
                   batch: Batch<u64>,
                   _handler: Arc<dyn BatchHandler<u64>>,
                   aggregator: AggregatorHandle<u64>| async move {
        for item in batch.iter() {
            aggregator.enqueue(*item).await;
        }
    };

    let config = AggregatorConfig::builder()
        .batch_size(3)
        .workers(1)
        .linger_time(Duration::from_millis(50))
        .build()?;
    let mut aggregator = Aggregator::<u64>::builder(handler)
        .config(config)
        .error_handler(requeue)
        .build();
    aggregator.start()?;

    for item in 1..=3 {
        aggregator.enqueue(item).await;
    }
    wait_for_batches(&recorded, 1, Duration::from_secs(2)).await?;
    let snapshot = aggregator.safe_stop().await;

    assert_eq!(recorded.sorted_items(), vec![1, 2, 3]);
    assert_eq!(snapshot.enqueued_items, 6);
    assert_eq!(snapshot.failed_batches, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn try_enqueue_drops_items_when_the_queue_stays_full() -> Result<()> {
    init_tracing();
    let config = AggregatorConfig::builder()
        .workers(1)
        .channel_buffer_size(1)
        .build()?;
    let (handler, recorded) = RecordingHandler::new();
    let mut aggregator = Aggregator::<u64>::new(config, handler);
    assert_eq!(aggregator.handle().queue_capacity(), 1);

    assert!(aggregator.try_enqueue(1).await);
    let rejected = timeout(Duration::from_millis(200), aggregator.try_enqueue(2))
        .await
        .context("try_enqueue must not wait for capacity")?;
    assert!(!rejected);
    assert_eq!(aggregator.telemetry().dropped_items, 1);

    aggregator.start()?;
    aggregator.safe_stop().await;
    assert_eq!(recorded.batches(), vec![vec![1]]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_producers_feed_the_aggregator() -> Result<()> {
    init_tracing();
    let config = AggregatorConfig::builder()
        .batch_size(5)
        .workers(2)
        .build()?;
    let (handler, recorded) = RecordingHandler::new();
    let mut aggregator = Aggregator::<u64>::builder(handler)
        .config(config)
        .logger(TracingLogger)
        .build();
    aggregator.start()?;

    let handle = aggregator.handle();
    tokio::task::spawn_blocking(move || {
        for item in 0..10 {
            handle.blocking_enqueue(item);
        }
    })
    .await?;
    aggregator.safe_stop().await;

    assert_eq!(recorded.sorted_items(), (0..10).collect::<Vec<_>>());
    Ok(())
}

#[derive(Default)]
struct CollectingLogger {
    records: Mutex<Vec<(&'static str, String, String)>>,
}

impl CollectingLogger {
    fn push(&self, level: &'static str, component: &str, message: fmt::Arguments<'_>) {
        self.records
            .lock()
            .unwrap()
            .push((level, component.to_string(), message.to_string()));
    }
}

impl Logger for CollectingLogger {
    fn info(&self, component: &str, message: fmt::Arguments<'_>) {
        self.push("info", component, message);
    }

    fn warn(&self, component: &str, _error: Option<&AnyError>, message: fmt::Arguments<'_>) {
        self.push("warn", component, message);
    }

    fn error(&self, component: &str, _error: Option<&AnyError>, message: fmt::Arguments<'_>) {
        self.push("error", component, message);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn custom_logger_receives_component_tagged_records() -> Result<()> {
    init_tracing();
    let logger = Arc::new(CollectingLogger::default());
    let config = AggregatorConfig::builder()
        .batch_size(2)
        .workers(1)
        .build()?;
    let (handler, _recorded) = RecordingHandler::new();
    let mut aggregator = Aggregator::<u64>::builder(handler)
        .config(config)
        .logger(logger.clone())
        .build();
    aggregator.start()?;

    aggregator.enqueue(1).await;
    aggregator.enqueue(2).await;
    aggregator.safe_stop().await;

    let records = logger.records.lock().unwrap();
    assert!(records
        .iter()
        .all(|(_, component, _)| component == AGGREGATOR_COMPONENT));
    assert!(records
        .iter()
        .any(|(level, _, message)| *level == "info" && message == "2 items have been sent."));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_handler_does_not_stop_the_pool() -> Result<()> {
    init_tracing();
    let (recording, recorded) = RecordingHandler::new();
    let handler = move |batch: Batch<u64>| {
        let write = recording.handle(batch.clone());
        async move {
            if batch.contains(&13) {
                panic!("corrupt record {}", batch[0]);
            }
            write.await
        }
    };
    let config = AggregatorConfig::builder()
        .batch_size(1)
        .workers(1)
        .build()?;
    let mut aggregator = Aggregator::<u64>::new(config, handler);
    aggregator.start()?;

    aggregator.enqueue(13).await;
    aggregator.enqueue(14).await;
    wait_for_batches(&recorded, 1, Duration::from_secs(2)).await?;
    sleep(Duration::from_millis(20)).await;
    let snapshot = aggregator.safe_stop().await;

    assert_eq!(recorded.batches(), vec![vec![14]]);
    assert_eq!(snapshot.worker_restarts, 1);
    Ok(())
}
