use crate::{
    api::{KeySelector, WatchUpdate},
    error::TaskJoin,
    pool::WorkerPool,
    Error,
};
use snafu::ResultExt;
use std::sync::Arc;
use tokio::{
    sync::{mpsc::Receiver, oneshot},
    task::JoinHandle,
};

/// Channel used to receive updates from a watch setup through `StoreKv::watch_kv`.
pub type StoreWatchReceiver = Receiver<Result<WatchUpdate, Error>>;

/// An established watch.
/// Dropping it cancels the watch.
#[derive(Debug)]
pub struct StoreWatch {
    selector: KeySelector,
    receiver: StoreWatchReceiver,
    cancel: Option<oneshot::Sender<()>>,
}

impl StoreWatch {
    pub(crate) fn new(
        selector: KeySelector,
        receiver: StoreWatchReceiver,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            selector,
            receiver,
            cancel: Some(cancel),
        }
    }
    /// The entries being watched.
    pub fn selector(&self) -> &KeySelector {
        &self.selector
    }
    /// Receive the next update.
    /// Returns `None` once the watch has ended, after any buffered update has been received.
    pub async fn recv(&mut self) -> Option<Result<WatchUpdate, Error>> {
        self.receiver.recv().await
    }
    /// Cancel the watch. Updates already buffered can still be received.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.send(()).ok();
        }
    }

    /// Deliver this watch's updates to the `observer`, each callback running on the `pool`.
    /// Callbacks are delivered one at a time, in the order the store reported them.
    /// Once the watch ends, for whichever reason, `WatchObserver::on_completed` is delivered.
    pub fn start(mut self, pool: &WorkerPool, observer: Arc<dyn WatchObserver>) -> WatchHandle {
        let cancel = self.cancel.take();
        let selector = self.selector.clone();
        let pool = pool.clone();

        let mut watch = self;
        let task = tokio::spawn(async move {
            let selector = watch.selector.clone();
            while let Some(next) = watch.recv().await {
                let callback = observer.clone();
                let delivered = match next {
                    Ok(update) => pool.run(move || callback.on_next(update)).await,
                    Err(error) => pool.run(move || callback.on_error(error)).await,
                };
                if let Err(error) = delivered {
                    tracing::error!(%selector, %error, "Failed to deliver watch update");
                    break;
                }
            }
            drop(watch);

            let callback = observer.clone();
            if let Err(Error::PoolShutdown) = pool.run(move || callback.on_completed()).await {
                observer.on_completed();
            }
        });

        WatchHandle {
            selector,
            cancel,
            task,
        }
    }
}

impl Drop for StoreWatch {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Receives the notifications of a watch started with `StoreWatch::start`.
pub trait WatchObserver: Send + Sync + 'static {
    /// A new update was received.
    fn on_next(&self, update: WatchUpdate);
    /// The watch failed, `on_completed` follows.
    fn on_error(&self, error: Error);
    /// The watch ended, no more callbacks follow.
    fn on_completed(&self);
}

/// Handle to a watch delivering to an observer.
#[derive(Debug)]
pub struct WatchHandle {
    selector: KeySelector,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// The entries being watched.
    pub fn selector(&self) -> &KeySelector {
        &self.selector
    }
    /// Close the watch and wait until the observer has been notified of its completion.
    pub async fn close(mut self) -> Result<(), Error> {
        if let Some(cancel) = self.cancel.take() {
            cancel.send(()).ok();
        }
        (&mut self.task).await.context(TaskJoin {
            task: format!("watch {}", self.selector),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::sync::mpsc::channel;

    #[derive(Default)]
    struct Notifications(Mutex<Vec<String>>);
    impl WatchObserver for Notifications {
        fn on_next(&self, update: WatchUpdate) {
            self.0.lock().push(format!("next: {update}"));
        }
        fn on_error(&self, error: Error) {
            self.0.lock().push(format!("error: {error}"));
        }
        fn on_completed(&self) {
            self.0.lock().push("completed".to_string());
        }
    }

    #[tokio::test]
    async fn error_then_completed() {
        let selector = KeySelector::prefix("/hello/");
        let (sender, receiver) = channel(4);
        let (cancel, _cancelled) = oneshot::channel();
        sender
            .send(Ok(WatchUpdate {
                revision: 2,
                events: vec![],
            }))
            .await
            .unwrap();
        sender
            .send(Err(Error::WatchCancelled {
                selector: selector.to_string(),
                reason: "compacted".to_string(),
            }))
            .await
            .unwrap();
        drop(sender);

        let pool = WorkerPool::new(2);
        let observer = Arc::new(Notifications::default());
        let watch = StoreWatch::new(selector, receiver, cancel).start(&pool, observer.clone());
        watch.close().await.unwrap();
        pool.shutdown().await;

        assert_eq!(
            observer.0.lock().as_slice(),
            [
                "next: WatchUpdate[rev=2, events=[]]",
                "error: Watch for /hello/* cancelled by the store, reason: 'compacted'",
                "completed",
            ]
        );
    }
}
