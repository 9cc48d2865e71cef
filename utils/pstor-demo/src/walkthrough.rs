use crate::printer::Printer;
use pstor::{Error, KeySelector, Store, WatchObserver, WatchUpdate, WorkerPool};
use std::{sync::Arc, time::Duration};

/// Which entries are removed at the end of the walkthrough.
#[derive(Debug, Clone, Copy, Eq, PartialEq, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Cleanup {
    /// Every key in the store.
    All,
    /// Only the keys under the walkthrough prefix.
    Prefix,
    /// Leave everything in place.
    None,
}

/// The literals the walkthrough works with.
#[derive(Debug, Clone)]
pub(crate) struct WalkthroughArgs {
    /// The key which is written and read back.
    pub(crate) key: String,
    /// The prefix under which the bulk writes go.
    pub(crate) prefix: String,
    /// Number of bulk writes.
    pub(crate) count: u32,
    /// How long to let asynchronous notifications settle.
    pub(crate) settle: Duration,
    pub(crate) cleanup: Cleanup,
}
impl Default for WalkthroughArgs {
    fn default() -> Self {
        Self {
            key: "hello".to_string(),
            prefix: "/hello/".to_string(),
            count: 99,
            settle: Duration::from_secs(1),
            cleanup: Cleanup::All,
        }
    }
}

/// Prints every watch notification.
struct PrintObserver {
    printer: Printer,
}
impl WatchObserver for PrintObserver {
    fn on_next(&self, update: WatchUpdate) {
        self.printer.line(format!("watch event: {update}"));
    }
    fn on_error(&self, error: Error) {
        self.printer.line(format!("watch error: {error}"));
    }
    fn on_completed(&self) {
        self.printer.line("watch completed");
    }
}

/// Exercises a store: sync and async reads and writes, watches over all keys and over a
/// prefix, a bulk write and a bulk delete.
pub(crate) struct Walkthrough<S> {
    store: S,
    pool: WorkerPool,
    printer: Printer,
    args: WalkthroughArgs,
}

impl<S: Store + 'static> Walkthrough<S> {
    pub(crate) fn new(store: S, pool: WorkerPool, printer: Printer, args: WalkthroughArgs) -> Self {
        Self {
            store,
            pool,
            printer,
            args,
        }
    }

    /// Run all the steps, in order.
    /// Any store failure aborts the walkthrough, the worker pool is shut down regardless.
    pub(crate) async fn run(mut self) -> anyhow::Result<()> {
        let result = self.steps().await;
        self.pool.shutdown().await;
        result
    }

    async fn steps(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(self.store.online().await, "The store is not online");
        let observer: Arc<dyn WatchObserver> = Arc::new(PrintObserver {
            printer: self.printer.clone(),
        });
        let key = KeySelector::key(self.args.key.as_str());
        let prefix = KeySelector::prefix(self.args.prefix.as_str());

        tokio::time::sleep(self.args.settle).await;

        // report all key changes
        let watch = self
            .store
            .watch_kv(&KeySelector::AllKeys)
            .await?
            .start(&self.pool, observer.clone());
        tracing::info!(selector = %watch.selector(), "Watching");

        self.store.put_kv(self.args.key.as_str(), "test").await?;
        let result = self.store.get_kv(&key).await?;
        self.printer.dump(&result);
        self.store.put_kv(self.args.key.as_str(), "test update").await?;

        // read again, this time printing the result from a worker once it completes
        let mut reader = self.store.clone();
        let printer = self.printer.clone();
        let async_key = key.clone();
        self.pool.listen(
            async move { reader.get_kv(&async_key).await },
            move |result| match result {
                Ok(result) => printer.dump(&result),
                Err(error) => tracing::error!(%error, "Exception in task"),
            },
        )?;

        // close the watch so we can make a new one
        watch.close().await?;
        let watch = self
            .store
            .watch_kv(&prefix)
            .await?
            .start(&self.pool, observer);
        tracing::info!(selector = %watch.selector(), "Watching");

        for n in 1 ..= self.args.count {
            let key = format!("{}{n}", self.args.prefix);
            self.store.put_kv(key, "test").await?;
        }
        tracing::info!(count = self.args.count, prefix = %prefix, "Bulk write complete");

        let deleted = match self.args.cleanup {
            Cleanup::All => self.store.delete_kv(&KeySelector::AllKeys).await?,
            Cleanup::Prefix => self.store.delete_kv(&prefix).await?,
            Cleanup::None => 0,
        };
        tracing::info!(deleted, cleanup = self.args.cleanup.as_ref(), "Cleanup complete");

        tokio::time::sleep(self.args.settle).await;
        watch.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::{tests::Captured, OutputFormat};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pstor::{memory::MemStore, RangeResult, StoreKey, StoreKv, StoreValue, StoreWatch};

    /// Records the calls made to the inner store.
    #[derive(Clone)]
    struct Recording<S> {
        inner: S,
        calls: Arc<Mutex<Vec<String>>>,
        online: bool,
        /// Reads from this many onwards fail.
        failing_gets: Option<usize>,
    }
    impl<S> Recording<S> {
        fn new(inner: S) -> Self {
            Self {
                inner,
                calls: Default::default(),
                online: true,
                failing_gets: None,
            }
        }
        fn record(&self, call: String) {
            self.calls.lock().push(call);
        }
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }
    #[async_trait]
    impl<S: StoreKv> StoreKv for Recording<S> {
        async fn put_kv<K: StoreKey, V: StoreValue>(
            &mut self,
            key: K,
            value: V,
        ) -> Result<(), Error> {
            let (key, value) = (key.into(), value.into());
            self.record(format!(
                "put {} {}",
                String::from_utf8_lossy(&key),
                String::from_utf8_lossy(&value)
            ));
            self.inner.put_kv(key, value).await
        }
        async fn get_kv(&mut self, selector: &KeySelector) -> Result<RangeResult, Error> {
            let gets = self
                .calls()
                .iter()
                .filter(|call| call.starts_with("get "))
                .count();
            self.record(format!("get {selector}"));
            if self.failing_gets.is_some_and(|failing| gets >= failing) {
                return Err(Error::Timeout {
                    operation: "get".to_string(),
                    timeout: Duration::from_millis(1),
                });
            }
            self.inner.get_kv(selector).await
        }
        async fn delete_kv(&mut self, selector: &KeySelector) -> Result<u64, Error> {
            self.record(format!("delete {selector}"));
            self.inner.delete_kv(selector).await
        }
        async fn watch_kv(&mut self, selector: &KeySelector) -> Result<StoreWatch, Error> {
            self.record(format!("watch {selector}"));
            self.inner.watch_kv(selector).await
        }
    }
    #[async_trait]
    impl<S: Store> Store for Recording<S> {
        async fn online(&mut self) -> bool {
            self.online
        }
    }

    fn args(count: u32, cleanup: Cleanup) -> WalkthroughArgs {
        WalkthroughArgs {
            count,
            settle: Duration::from_millis(50),
            cleanup,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn call_sequence() {
        let memory = MemStore::new();
        let store = Recording::new(memory.clone());
        let captured = Captured::default();
        let printer = Printer::new(OutputFormat::Plain, Box::new(captured.clone()));

        Walkthrough::new(store.clone(), WorkerPool::new(10), printer, args(3, Cleanup::All))
            .run()
            .await
            .unwrap();

        let mut calls = store.calls();
        // the async read can land anywhere after the second put
        let async_get = calls.iter().rposition(|call| call == "get hello").unwrap();
        assert!(async_get > 3, "{calls:?}");
        calls.remove(async_get);
        assert_eq!(
            calls,
            vec![
                "watch <all keys>",
                "put hello test",
                "get hello",
                "put hello test update",
                "watch /hello/*",
                "put /hello/1 test",
                "put /hello/2 test",
                "put /hello/3 test",
                "delete <all keys>",
            ]
        );
        assert!(memory.is_empty());

        let output = captured.text();
        let lines = output.lines().collect::<Vec<_>>();
        assert!(lines.contains(&"0 : hello : test"), "{output}");
        assert!(lines.contains(&"0 : hello : test update"), "{output}");
        assert!(
            lines.contains(&"watch event: WatchUpdate[rev=1, events=[PUT hello=test]]"),
            "{output}"
        );
        assert!(lines.contains(&"watch event: WatchUpdate[rev=3, events=[PUT /hello/1=test]]"));
        assert!(lines.contains(&"watch event: WatchUpdate[rev=5, events=[PUT /hello/3=test]]"));
        // only the prefixed keys are reported by the second watch
        assert!(lines.contains(
            &"watch event: WatchUpdate[rev=6, events=[DELETE /hello/1, DELETE /hello/2, DELETE /hello/3]]"
        ));
        assert_eq!(lines.iter().filter(|line| **line == "watch completed").count(), 2);
        assert_eq!(lines.last(), Some(&"watch completed"));
    }

    #[tokio::test]
    async fn failed_async_read() {
        let logs = Captured::default();
        let log_writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || log_writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut store = Recording::new(MemStore::new());
        store.failing_gets = Some(1);
        let captured = Captured::default();
        let printer = Printer::new(OutputFormat::Plain, Box::new(captured.clone()));

        Walkthrough::new(store.clone(), WorkerPool::new(2), printer, args(2, Cleanup::All))
            .run()
            .await
            .unwrap();

        let output = captured.text();
        assert!(output.lines().any(|line| line == "0 : hello : test"), "{output}");
        assert!(!output.lines().any(|line| line == "0 : hello : test update"), "{output}");
        let logs = logs.text();
        assert!(logs.contains("Exception in task"), "{logs}");
        assert!(logs.contains("Timed out during get operation"), "{logs}");
        assert_eq!(store.calls().last().map(String::as_str), Some("delete <all keys>"));
    }

    #[tokio::test]
    async fn prefix_cleanup() {
        let mut memory = MemStore::new();
        let printer = Printer::new(OutputFormat::Plain, Box::new(Captured::default()));

        Walkthrough::new(memory.clone(), WorkerPool::new(2), printer, args(5, Cleanup::Prefix))
            .run()
            .await
            .unwrap();

        let remaining = memory.get_kv(&KeySelector::AllKeys).await.unwrap();
        assert_eq!(remaining.count, 1);
        assert_eq!(remaining.kvs[0].value_str(), "test update");
    }

    #[tokio::test]
    async fn no_cleanup() {
        let memory = MemStore::new();
        let printer = Printer::new(OutputFormat::Plain, Box::new(Captured::default()));

        Walkthrough::new(memory.clone(), WorkerPool::new(2), printer, args(99, Cleanup::None))
            .run()
            .await
            .unwrap();
        assert_eq!(memory.len(), 100);
    }

    #[tokio::test]
    async fn offline_store() {
        let mut store = Recording::new(MemStore::new());
        store.online = false;
        let pool = WorkerPool::new(1);
        let printer = Printer::new(OutputFormat::Plain, Box::new(Captured::default()));

        let result = Walkthrough::new(store.clone(), pool.clone(), printer, args(1, Cleanup::All))
            .run()
            .await;
        assert!(result.is_err());
        assert!(store.calls().is_empty());
        assert!(pool.is_shutdown());
    }
}
