use log::debug;
use tokio::task;

use super::{Coordinator, Enqueuer};
use crate::Result;

/// Feeds a queue from a blocking source on Tokio's blocking pool.
///
/// The runner stops when the source ends, when the queue gets closed by its consumer or when the
/// coordinator asks it to. All three close the queue by dropping the enqueuer. A source error is
/// reported to the coordinator.
pub struct QueueRunner;

impl QueueRunner {
    /// Starts feeding `queue` from `source` and registers the task with `coordinator`.
    ///
    /// # Arguments
    /// * `source` - The items to enqueue, in order.
    /// * `queue` - The producing end of the queue.
    /// * `coordinator` - Where the task is registered and errors get reported.
    pub fn start<I, T>(source: I, queue: Enqueuer<T>, coordinator: &Coordinator)
    where
        I: Iterator<Item = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let coord = coordinator.clone();
        let handle = task::spawn_blocking(move || {
            let enqueued = Self::run(source, &queue, &coord);
            debug!(enqueued = enqueued; "queue runner finished");
        });

        coordinator.register(handle);
    }

    /// Enqueues items until one of the stop conditions is met.
    ///
    /// # Returns
    /// The amount of enqueued items.
    fn run<I, T>(source: I, queue: &Enqueuer<T>, coordinator: &Coordinator) -> usize
    where
        I: Iterator<Item = Result<T>>,
    {
        let mut enqueued = 0;

        for item in source {
            if coordinator.should_stop() {
                debug!("queue runner cancelled");
                break;
            }

            match item {
                Ok(item) => {
                    if queue.blocking_enqueue(item).is_err() {
                        debug!("queue closed by its consumer");
                        break;
                    }

                    enqueued += 1;
                }
                Err(e) => {
                    coordinator.report_error(e);
                    break;
                }
            }
        }

        enqueued
    }
}
