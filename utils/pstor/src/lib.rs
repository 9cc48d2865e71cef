//! The persistent stor is an interface to a key-value datastore.
//! The etcd implementation talks to a remote cluster, the in-memory one is embedded and
//! mostly useful for testing and dry runs.

/// Error exposed by the pstor.
pub mod error;
/// Export error module.
pub use error::Error;

/// The stor interface.
mod api;
/// Export pstor module.
pub use api::{
    EventType, KeySelector, KeyValue, RangeResult, Store, StoreKey, StoreKv, StoreValue,
    WatchEvent, WatchUpdate,
};

/// A particular implementation of the persistent store, using ETCd.
pub mod etcd;
/// An embedded implementation of the persistent store.
pub mod memory;

/// Fixed size pool used to run completion callbacks.
pub mod pool;
pub use pool::WorkerPool;

/// Watch streams and their observers.
pub mod watch;
pub use watch::{StoreWatch, WatchHandle, WatchObserver};
