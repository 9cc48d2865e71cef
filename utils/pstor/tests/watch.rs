use parking_lot::Mutex;
use pstor::{
    memory::MemStore, Error, KeySelector, StoreKv, WatchObserver, WatchUpdate, WorkerPool,
};
use std::sync::Arc;

/// Records every callback it receives, in order.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}
impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}
impl WatchObserver for Recorder {
    fn on_next(&self, update: WatchUpdate) {
        self.calls.lock().push(update.to_string());
    }
    fn on_error(&self, error: Error) {
        self.calls.lock().push(format!("error: {error}"));
    }
    fn on_completed(&self) {
        self.calls.lock().push("completed".to_string());
    }
}

#[tokio::test]
async fn observer_sees_ordered_updates() {
    let pool = WorkerPool::new(10);
    let mut store = MemStore::new();
    let recorder = Arc::new(Recorder::default());

    let watch = store
        .watch_kv(&KeySelector::AllKeys)
        .await
        .unwrap()
        .start(&pool, recorder.clone());

    for n in 1 ..= 20 {
        store.put_kv(format!("/hello/{n}"), "test").await.unwrap();
    }
    store.delete_kv(&KeySelector::prefix("/hello/1")).await.unwrap();

    // let the relay drain before closing
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    watch.close().await.unwrap();

    let calls = recorder.calls();
    assert_eq!(calls.len(), 22, "{calls:#?}");
    for (index, call) in calls.iter().take(20).enumerate() {
        let n = index + 1;
        assert_eq!(
            call,
            &format!("WatchUpdate[rev={n}, events=[PUT /hello/{n}=test]]")
        );
    }
    // "/hello/1" and "/hello/10" to "/hello/19"
    assert_eq!(calls[20].matches("DELETE").count(), 11);
    assert_eq!(calls[21], "completed");
    pool.shutdown().await;
}

#[tokio::test]
async fn closed_watch_sees_nothing_more() {
    let pool = WorkerPool::new(2);
    let mut store = MemStore::new();
    let recorder = Arc::new(Recorder::default());

    let watch = store
        .watch_kv(&KeySelector::key("hello"))
        .await
        .unwrap()
        .start(&pool, recorder.clone());
    watch.close().await.unwrap();

    store.put_kv("hello", "test").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(recorder.calls(), vec!["completed".to_string()]);
    pool.shutdown().await;
}

#[tokio::test]
async fn completion_after_pool_shutdown() {
    let pool = WorkerPool::new(1);
    let mut store = MemStore::new();
    let recorder = Arc::new(Recorder::default());

    let watch = store
        .watch_kv(&KeySelector::AllKeys)
        .await
        .unwrap()
        .start(&pool, recorder.clone());
    pool.shutdown().await;
    watch.close().await.unwrap();

    assert_eq!(recorder.calls(), vec!["completed".to_string()]);
}

#[tokio::test]
async fn async_get_listener() {
    let pool = WorkerPool::new(10);
    let mut store = MemStore::new();
    store.put_kv("hello", "test").await.unwrap();

    let (sender, receiver) = tokio::sync::oneshot::channel();
    let mut reader = store.clone();
    pool.listen(
        async move { reader.get_kv(&KeySelector::key("hello")).await },
        move |result| {
            let value = result.map(|range| range.first().map(|kv| kv.value_str().to_string()));
            sender.send(value).ok();
        },
    )
    .unwrap();

    let value = receiver.await.unwrap().unwrap();
    assert_eq!(value.as_deref(), Some("test"));
    pool.shutdown().await;
}
