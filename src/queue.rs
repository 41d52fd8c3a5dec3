//! Bounded multi-producer, multi-consumer FIFO shared by producers and workers.
//!
//! Built on a Tokio `mpsc` channel. The single receiver sits behind an async
//! mutex so any worker can claim the next item; `recv` is cancel-safe, so a
//! worker that abandons a receive inside `select!` never loses an item.

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

pub struct BatchQueue<T> {
    tx: mpsc::Sender<T>,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for BatchQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> BatchQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than zero");
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Items waiting in the queue that no worker has claimed yet.
    pub fn len(&self) -> usize {
        self.tx.max_capacity().saturating_sub(self.tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for a free slot, then enqueues. Fails only if every receiver is gone.
    pub async fn push(&self, item: T) -> Result<(), T> {
        self.tx.send(item).await.map_err(|err| err.0)
    }

    /// Enqueues without waiting; hands the item back if the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.tx.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) | TrySendError::Closed(item) => item,
        })
    }

    /// Blocking variant of [`push`](Self::push) for callers outside the async runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_push(&self, item: T) -> Result<(), T> {
        self.tx.blocking_send(item).map_err(|err| err.0)
    }

    /// Claims the next item. Returns `None` once every sender is gone and the
    /// queue is drained.
    pub async fn recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
