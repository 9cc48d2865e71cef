use crate::Error;
use parking_lot::Mutex;
use std::{future::Future, sync::Arc};
use tokio::{
    sync::{oneshot, Semaphore},
    task::JoinSet,
};

/// A fixed size pool of workers.
/// Tasks are accepted until the pool is shut down, but at most `size` of them run at a time,
/// the others wait until a worker is free. Waiting tasks are not started in any particular
/// order.
#[derive(Clone)]
pub struct WorkerPool {
    size: usize,
    workers: Arc<Semaphore>,
    tasks: Arc<Mutex<Option<JoinSet<()>>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("idle", &self.workers.available_permits())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl WorkerPool {
    /// New pool with `size` workers, at least one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            workers: Arc::new(Semaphore::new(size)),
            tasks: Arc::new(Mutex::new(Some(JoinSet::new()))),
        }
    }
    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }
    /// Whether `shutdown` has been called.
    pub fn is_shutdown(&self) -> bool {
        self.tasks.lock().is_none()
    }

    /// Submit a task to the pool.
    /// Fails with `Error::PoolShutdown` if the pool no longer accepts tasks.
    pub fn spawn<F>(&self, task: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        let Some(tasks) = tasks.as_mut() else {
            return Err(Error::PoolShutdown);
        };
        // reap the completed tasks so the set only holds the pending ones
        while let Some(result) = tasks.try_join_next() {
            if let Err(error) = result {
                tracing::error!(%error, "Worker pool task failed");
            }
        }
        let workers = self.workers.clone();
        tasks.spawn(async move {
            // the semaphore is never closed
            let _worker = workers.acquire_owned().await;
            task.await;
        });
        Ok(())
    }

    /// Run `work` on a worker and wait for its result.
    pub async fn run<F, T>(&self, work: F) -> Result<T, Error>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.spawn(async move {
            sender.send(work()).ok();
        })?;
        receiver.await.map_err(|_| Error::TaskAborted)
    }

    /// Run `future` on a worker and, once it completes, call `listener` with its output
    /// on that same worker.
    pub fn listen<F, L>(&self, future: F, listener: L) -> Result<(), Error>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
        L: FnOnce(F::Output) + Send + 'static,
    {
        self.spawn(async move { listener(future.await) })
    }

    /// Stop accepting new tasks and wait for the submitted ones to complete.
    /// A task which panics is logged and does not affect the others.
    pub async fn shutdown(&self) {
        let Some(mut tasks) = self.tasks.lock().take() else {
            return;
        };
        tracing::debug!(pending = tasks.len(), "Shutting down the worker pool");
        while let Some(result) = tasks.join_next().await {
            if let Err(error) = result {
                tracing::error!(%error, "Worker pool task failed");
            }
        }
    }
}
