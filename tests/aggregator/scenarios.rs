use std::collections::BTreeSet;
use std::time::Duration;

use crate::support::helpers::{
    assert_batches_within, init_tracing, wait_for_batches, RecordingHandler,
};
use anyhow::Result;
use batchline::{Aggregator, AggregatorConfig, AggregatorState};
use tokio::time::sleep;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_splits_by_batch_size() -> Result<()> {
    init_tracing();
    let config = AggregatorConfig::builder()
        .batch_size(3)
        .workers(1)
        .build()?;
    let (handler, recorded) = RecordingHandler::new();
    let mut aggregator = Aggregator::<u64>::new(config, handler);
    aggregator.start()?;

    for item in 1..=4 {
        aggregator.enqueue(item).await;
    }
    aggregator.safe_stop().await;

    assert_eq!(recorded.batches(), vec![vec![1, 2, 3], vec![4]]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_batch_flushes_after_linger() -> Result<()> {
    init_tracing();
    let config = AggregatorConfig::builder()
        .batch_size(5)
        .workers(1)
        .linger_time(Duration::from_millis(100))
        .build()?;
    let (handler, recorded) = RecordingHandler::new();
    let mut aggregator = Aggregator::<u64>::new(config, handler);
    aggregator.start()?;

    aggregator.enqueue(1).await;
    aggregator.enqueue(2).await;
    sleep(Duration::from_millis(150)).await;

    assert_eq!(recorded.batches(), vec![vec![1, 2]]);
    let snapshot = aggregator.stop().await;
    assert_eq!(snapshot.linger_flushes, 1);
    assert_eq!(recorded.batch_count(), 1, "nothing left to flush on stop");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drain_safe_stop_delivers_every_item_across_workers() -> Result<()> {
    init_tracing();
    let batch_size = 8;
    let total: u64 = 1_000;
    let config = AggregatorConfig::builder()
        .batch_size(batch_size)
        .workers(4)
        .channel_buffer_size(16)
        .build()?;
    let (handler, recorded) = RecordingHandler::new();
    let mut aggregator = Aggregator::<u64>::new(config, handler);
    aggregator.start()?;

    let producers: Vec<_> = (0..4u64)
        .map(|producer| {
            let handle = aggregator.handle();
            tokio::spawn(async move {
                for offset in 0..total / 4 {
                    handle.enqueue(producer * (total / 4) + offset).await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await?;
    }

    let snapshot = aggregator.safe_stop().await;

    let batches = recorded.batches();
    assert_batches_within(&batches, batch_size);
    assert!(batches.len() >= (total as usize).div_ceil(batch_size));
    assert_eq!(recorded.sorted_items(), (0..total).collect::<Vec<_>>());
    assert_eq!(snapshot.enqueued_items, total);
    assert_eq!(snapshot.dispatched_items, total);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn maximal_linger_time_never_loses_items() -> Result<()> {
    init_tracing();
    let config = AggregatorConfig::builder()
        .batch_size(2)
        .workers(1)
        .linger_time(Duration::MAX)
        .build()?;
    let (handler, recorded) = RecordingHandler::new();
    let mut aggregator = Aggregator::<u64>::new(config, handler);
    aggregator.start()?;

    for item in 1..=5 {
        aggregator.enqueue(item).await;
    }
    let snapshot = aggregator.safe_stop().await;

    assert_eq!(
        recorded.batches(),
        vec![vec![1, 2], vec![3, 4], vec![5]]
    );
    assert_eq!(snapshot.worker_restarts, 0);
    assert_eq!(snapshot.dispatched_items, 5);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_preserves_fifo_order() -> Result<()> {
    init_tracing();
    let config = AggregatorConfig::builder()
        .batch_size(4)
        .workers(1)
        .channel_buffer_size(64)
        .build()?;
    let (handler, recorded) = RecordingHandler::new();
    let mut aggregator = Aggregator::<u64>::new(config, handler);
    aggregator.start()?;

    for item in 0..50 {
        aggregator.enqueue(item).await;
    }
    aggregator.safe_stop().await;

    let flattened: Vec<u64> = recorded.batches().into_iter().flatten().collect();
    assert_eq!(flattened, (0..50).collect::<Vec<_>>());
    assert_eq!(recorded.batch_count(), 13);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_handler_only_blocks_its_own_worker() -> Result<()> {
    init_tracing();
    let config = AggregatorConfig::builder()
        .batch_size(1)
        .workers(3)
        .channel_buffer_size(16)
        .build()?;
    let (handler, recorded) = RecordingHandler::with_delay(Duration::from_millis(100));
    let mut aggregator = Aggregator::<u64>::new(config, handler);
    aggregator.start()?;

    for item in 0..3 {
        aggregator.enqueue(item).await;
    }
    wait_for_batches(&recorded, 3, Duration::from_secs(2)).await?;
    aggregator.safe_stop().await;

    assert!(
        recorded.max_active() > 1,
        "workers should dispatch concurrently, max active was {}",
        recorded.max_active()
    );
    let items: BTreeSet<u64> = recorded.sorted_items().into_iter().collect();
    assert_eq!(items, (0..3).collect());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lifecycle_state_moves_forward() -> Result<()> {
    init_tracing();
    let config = AggregatorConfig::builder().workers(2).build()?;
    let (handler, _recorded) = RecordingHandler::new();
    let mut aggregator = Aggregator::<u64>::new(config, handler);
    let handle = aggregator.handle();
    let token = aggregator.cancellation_token();

    assert_eq!(aggregator.state(), AggregatorState::Created);
    aggregator.start()?;
    assert_eq!(handle.state(), AggregatorState::Running);

    let err = aggregator.start().unwrap_err();
    assert!(
        format!("{err}").contains("already been started"),
        "second start should be rejected"
    );

    assert!(!token.is_cancelled());
    aggregator.stop().await;
    assert!(token.is_cancelled());
    assert_eq!(handle.state(), AggregatorState::Stopped);
    Ok(())
}

#[test]
fn start_requires_a_tokio_runtime() {
    let (handler, _recorded) = RecordingHandler::new();
    let config = AggregatorConfig::builder().workers(1).build().unwrap();
    let mut aggregator = Aggregator::<u64>::new(config, handler);

    let err = aggregator.start().unwrap_err();
    assert!(format!("{err}").contains("Tokio runtime"));
    assert_eq!(aggregator.state(), AggregatorState::Created);
}
