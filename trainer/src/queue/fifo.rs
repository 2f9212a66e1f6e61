use tokio::sync::mpsc;

/// Returned when enqueueing into a queue whose consumer is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

/// Creates a bounded first in first out queue.
///
/// # Arguments
/// * `capacity` - The amount of items the queue holds before enqueueing blocks.
///
/// # Returns
/// The producing and consuming ends of the queue.
pub fn fifo<T>(capacity: usize) -> (Enqueuer<T>, Dequeuer<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Enqueuer { tx }, Dequeuer { rx })
}

/// The producing end of a queue. Dropping every `Enqueuer` closes the queue.
#[derive(Debug, Clone)]
pub struct Enqueuer<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Enqueuer<T> {
    /// Enqueues `item`, blocking the current thread while the queue is full.
    ///
    /// Must not be called from within an async context.
    pub fn blocking_enqueue(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.blocking_send(item).map_err(|_| QueueClosed)
    }

    /// Enqueues `item`, waiting while the queue is full.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }
}

/// The consuming end of a queue.
#[derive(Debug)]
pub struct Dequeuer<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Dequeuer<T> {
    /// Waits for the next item.
    ///
    /// # Returns
    /// `None` once the queue is closed and drained.
    pub async fn dequeue(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Returns the amount of items waiting in the queue.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Closes the queue, failing every pending and future enqueue.
    ///
    /// Items already in the queue can still be dequeued.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
