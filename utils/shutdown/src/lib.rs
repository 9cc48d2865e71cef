use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::{future::Future, sync::Arc};
use tokio::{signal::unix::SignalKind, sync::oneshot};

type ShutdownSync = Arc<Mutex<Shutdown>>;

/// Shutdown Event handler.
pub struct Shutdown {
    /// Listeners awaiting for the shutdown.
    listeners: Vec<oneshot::Sender<SignalKind>>,
    /// Which signal triggered the shutdown, once received.
    shutdown: Option<SignalKind>,
}
impl Shutdown {
    /// Get a sync wrapper of `Self`.
    /// The internal task to listen on the shutdown event is scheduled.
    fn new_sync(event: impl ShutdownEvent + 'static) -> ShutdownSync {
        let this = Arc::new(Mutex::new(Shutdown {
            listeners: Vec::new(),
            shutdown: None,
        }));
        let this_clone = this.clone();
        tokio::spawn(async move { Self::run(this_clone, event).await });
        this
    }
    /// Get a shutdown channel to await on, or the signal if it has already been received.
    fn shutdown_chan(&mut self) -> Result<oneshot::Receiver<SignalKind>, SignalKind> {
        match self.shutdown {
            Some(signal) => Err(signal),
            None => {
                let (send, receive) = oneshot::channel();
                self.listeners.push(send);
                Ok(receive)
            }
        }
    }
    /// Wait for the event and notify every listener.
    async fn run(this: ShutdownSync, event: impl ShutdownEvent) {
        let kind = event.wait().await;

        let mut this = this.lock();
        this.shutdown = Some(kind);
        for sender in std::mem::take(&mut this.listeners) {
            // It's ok if the receiver has already been dropped.
            sender.send(kind).ok();
        }
    }
    fn wait_on(this: &ShutdownSync) -> impl Future<Output = Option<SignalKind>> {
        let chan = this.lock().shutdown_chan();
        async move {
            match chan {
                Ok(wait) => wait.await.ok(),
                Err(signal) => Some(signal),
            }
        }
    }

    /// Returns a future that completes when INT or TERM is received, with the signal.
    /// None is returned if we failed to receive the event from the internal task.
    /// Must be called from within a tokio runtime.
    pub fn wait_sig() -> impl Future<Output = Option<SignalKind>> {
        static TERM: Lazy<ShutdownSync> = Lazy::new(|| Shutdown::new_sync(IntTermEvent {}));
        Self::wait_on(&TERM)
    }
    /// Helper async fn over `Self::wait_sig` with no return.
    pub async fn wait() {
        let _ = Self::wait_sig().await;
    }
    /// Run `future` to completion unless INT or TERM is received first, in which case
    /// the future is dropped and the signal is returned.
    pub async fn race<F: Future>(future: F) -> Result<F::Output, SignalKind> {
        Self::race_with(Self::wait_sig(), future).await
    }
    async fn race_with<F: Future>(
        signal: impl Future<Output = Option<SignalKind>>,
        future: F,
    ) -> Result<F::Output, SignalKind> {
        tokio::pin!(signal);
        tokio::select! {
            output = future => Ok(output),
            Some(kind) = &mut signal => Err(kind),
        }
    }
}

/// Internal Shutdown Event which returns which signal triggered it.
#[async_trait::async_trait]
trait ShutdownEvent: Send + Sync {
    async fn wait(&self) -> SignalKind;
}

/// Shutdown Event when INT | TERM are received.
struct IntTermEvent {}
#[async_trait::async_trait]
impl ShutdownEvent for IntTermEvent {
    async fn wait(&self) -> SignalKind {
        let mut sig_int =
            tokio::signal::unix::signal(SignalKind::interrupt()).expect("to register SIGINT");
        let mut sig_term =
            tokio::signal::unix::signal(SignalKind::terminate()).expect("to register SIGTERM");

        tokio::select! {
            _ = sig_int.recv() => {
                tracing::warn!(signal = ?SignalKind::interrupt(), "Signalled");
                SignalKind::interrupt()
            },
            _ = sig_term.recv() => {
                tracing::warn!(signal = ?SignalKind::terminate(), "Signalled");
                SignalKind::terminate()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct TestEvent {}
    #[async_trait::async_trait]
    impl ShutdownEvent for TestEvent {
        async fn wait(&self) -> SignalKind {
            SignalKind::alarm()
        }
    }

    #[tokio::test]
    async fn shutdown() {
        let event = Shutdown::new_sync(TestEvent {});
        assert_eq!(
            format!("{:?}", Shutdown::wait_on(&event).await),
            format!("{:?}", Some(SignalKind::alarm()))
        );
        // already signalled
        assert!(Shutdown::wait_on(&event).await.is_some());
    }

    #[tokio::test]
    async fn race() {
        let event = Shutdown::new_sync(TestEvent {});
        let interrupted = Shutdown::race_with(
            Shutdown::wait_on(&event),
            tokio::time::sleep(Duration::from_secs(60)),
        )
        .await;
        assert!(interrupted.is_err());

        let completed = Shutdown::race_with(std::future::pending(), async { 7 }).await;
        assert_eq!(completed.ok(), Some(7));
    }
}
