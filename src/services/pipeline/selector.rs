//! Slice Selectors
//!
//! A [`Selector`] watches the run snapshot and republishes one derived slice
//! of it, notifying its readers only when that slice actually changes.

use plan_pipeline_core::RunState;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Selector<T> {
    rx: watch::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Selector<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn spawn<F>(mut source: watch::Receiver<RunState>, select: F) -> Self
    where
        F: Fn(&RunState) -> T + Send + 'static,
    {
        let initial = select(&source.borrow_and_update());
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            while source.changed().await.is_ok() {
                let next = select(&source.borrow_and_update());
                tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
            }
        });

        Self { rx, task }
    }

    /// Current value of the slice
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the slice to change. Returns `None` once the consumer is gone.
    pub async fn changed(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl<T> Drop for Selector<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
