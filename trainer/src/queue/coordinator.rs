use std::{mem, sync::Arc};

use log::{debug, error};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{Result, TrainerErr};

/// Shared stop signal and error sink for the tasks feeding the training loop.
///
/// The first error reported wins, and reporting one also requests a stop.
#[derive(Debug, Clone, Default)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    token: CancellationToken,
    error: Mutex<Option<TrainerErr>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every registered task to stop.
    pub fn request_stop(&self) {
        if !self.inner.token.is_cancelled() {
            debug!("stop requested");
        }

        self.inner.token.cancel();
    }

    pub fn should_stop(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Waits until a stop is requested.
    pub async fn stopped(&self) {
        self.inner.token.cancelled().await
    }

    /// Records `err` unless an earlier one was already recorded, then requests a stop.
    pub fn report_error(&self, err: TrainerErr) {
        {
            let mut slot = self.inner.error.lock();
            if slot.is_some() {
                debug!("discarding later error: {err}");
            } else {
                error!("{err}");
                *slot = Some(err);
            }
        }

        self.request_stop();
    }

    /// Registers a task to be waited for on `join`.
    pub fn register(&self, handle: JoinHandle<()>) {
        self.inner.handles.lock().push(handle);
    }

    /// Waits for every registered task to finish.
    ///
    /// # Returns
    /// The first error reported by any task, or a join error if one of them panicked.
    pub async fn join(&self) -> Result<()> {
        let handles = mem::take(&mut *self.inner.handles.lock());

        for handle in handles {
            if let Err(e) = handle.await {
                self.report_error(e.into());
            }
        }

        match self.inner.error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_is_shared() {
        let coordinator = Coordinator::new();
        let other = coordinator.clone();
        assert!(!other.should_stop());

        coordinator.request_stop();
        assert!(other.should_stop());
        other.stopped().await;
    }

    #[tokio::test]
    async fn first_error_wins() {
        let coordinator = Coordinator::new();

        coordinator.report_error(TrainerErr::Join("first".into()));
        coordinator.report_error(TrainerErr::Join("second".into()));
        assert!(coordinator.should_stop());

        match coordinator.join().await {
            Err(TrainerErr::Join(msg)) => assert_eq!(msg, "first"),
            other => panic!("expected the first error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_waits_for_tasks() {
        let coordinator = Coordinator::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        coordinator.register(tokio::spawn(async move {
            let _ = tx.send(());
        }));

        coordinator.join().await.unwrap();
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn panics_are_errors() {
        let coordinator = Coordinator::new();
        coordinator.register(tokio::task::spawn_blocking(|| panic!("runner panicked")));

        assert!(matches!(coordinator.join().await, Err(TrainerErr::Join(_))));
    }
}
