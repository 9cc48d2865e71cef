use crate::{
    api::{
        KeySelector, KeyValue, RangeResult, Store, StoreKey, StoreKv, StoreValue, WatchEvent,
        WatchUpdate,
    },
    watch::StoreWatch,
    Error,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{
    mpsc::{channel, unbounded_channel, UnboundedSender},
    oneshot,
};

/// An embedded key-value store with etcd-like revision semantics.
/// Every mutation bumps the store revision by one and is reported to the matching watches
/// as a single `WatchUpdate`.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<MemStoreInner>>,
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemStore")
            .field("revision", &inner.revision)
            .field("entries", &inner.entries.len())
            .field("watchers", &inner.watchers.len())
            .finish()
    }
}

#[derive(Default)]
struct MemStoreInner {
    revision: i64,
    entries: BTreeMap<Vec<u8>, KeyValue>,
    watchers: Vec<MemWatcher>,
}

struct MemWatcher {
    selector: KeySelector,
    updates: UnboundedSender<WatchUpdate>,
}

impl MemStoreInner {
    fn matching<'a>(
        &'a self,
        selector: &'a KeySelector,
    ) -> Box<dyn Iterator<Item = &'a KeyValue> + 'a> {
        match selector {
            KeySelector::Key(key) => Box::new(self.entries.get(key).into_iter()),
            KeySelector::Prefix(prefix) => Box::new(
                self.entries
                    .range(prefix.clone() ..)
                    .take_while(move |(key, _)| key.starts_with(prefix))
                    .map(|(_, kv)| kv),
            ),
            KeySelector::AllKeys => Box::new(self.entries.values()),
        }
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.revision += 1;
        let revision = self.revision;
        let kv = self
            .entries
            .entry(key.clone())
            .and_modify(|kv| {
                kv.value = value.clone();
                kv.mod_revision = revision;
                kv.version += 1;
            })
            .or_insert_with(|| KeyValue {
                key,
                value,
                create_revision: revision,
                mod_revision: revision,
                version: 1,
            })
            .clone();
        self.notify(vec![WatchEvent::Put(kv)]);
    }

    fn delete(&mut self, selector: &KeySelector) -> u64 {
        let keys = self
            .matching(selector)
            .map(|kv| kv.key.clone())
            .collect::<Vec<_>>();
        // deleting nothing is not a mutation
        if keys.is_empty() {
            return 0;
        }

        self.revision += 1;
        let revision = self.revision;
        let events = keys
            .into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .map(|kv| {
                WatchEvent::Delete(KeyValue {
                    key: kv.key,
                    mod_revision: revision,
                    ..Default::default()
                })
            })
            .collect::<Vec<_>>();
        let deleted = events.len() as u64;
        self.notify(events);
        deleted
    }

    /// Report the events of the current revision to every interested watcher.
    fn notify(&mut self, events: Vec<WatchEvent>) {
        self.watchers.retain(|watcher| !watcher.updates.is_closed());
        for watcher in &self.watchers {
            let events = events
                .iter()
                .filter(|event| watcher.selector.matches(&event.kv().key))
                .cloned()
                .collect::<Vec<_>>();
            if events.is_empty() {
                continue;
            }
            watcher
                .updates
                .send(WatchUpdate {
                    revision: self.revision,
                    events,
                })
                .ok();
        }
    }
}

impl MemStore {
    /// New empty store, at revision 0.
    pub fn new() -> Self {
        Self::default()
    }
    /// The current store revision.
    pub fn revision(&self) -> i64 {
        self.inner.lock().revision
    }
    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StoreKv for MemStore {
    async fn put_kv<K: StoreKey, V: StoreValue>(&mut self, key: K, value: V) -> Result<(), Error> {
        self.inner.lock().put(key.into(), value.into());
        Ok(())
    }

    async fn get_kv(&mut self, selector: &KeySelector) -> Result<RangeResult, Error> {
        let inner = self.inner.lock();
        let kvs = inner.matching(selector).cloned().collect::<Vec<_>>();
        Ok(RangeResult {
            revision: inner.revision,
            count: kvs.len() as u64,
            kvs,
        })
    }

    async fn delete_kv(&mut self, selector: &KeySelector) -> Result<u64, Error> {
        Ok(self.inner.lock().delete(selector))
    }

    /// Watch the entries matched by the selector.
    /// Updates are queued without bound inside the store and relayed to the returned watch,
    /// so a slow consumer never blocks writers.
    async fn watch_kv(&mut self, selector: &KeySelector) -> Result<StoreWatch, Error> {
        let (updates, mut queued) = unbounded_channel();
        self.inner.lock().watchers.push(MemWatcher {
            selector: selector.clone(),
            updates,
        });

        let (sender, receiver) = channel(100);
        let (cancel, mut cancelled) = oneshot::channel::<()>();
        tokio::spawn(async move {
            loop {
                // updates queued before the cancellation are still delivered
                let update = tokio::select! {
                    biased;
                    update = queued.recv() => match update {
                        Some(update) => update,
                        None => return,
                    },
                    _ = &mut cancelled => return,
                };
                if sender.send(Ok(update)).await.is_err() {
                    return;
                }
            }
        });
        Ok(StoreWatch::new(selector.clone(), receiver, cancel))
    }
}

#[async_trait]
impl Store for MemStore {
    async fn online(&mut self) -> bool {
        true
    }
}
