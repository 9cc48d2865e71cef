use std::path::PathBuf;

/// All errors that can be returned from the pstor.
#[derive(Debug, snafu::Snafu)]
#[snafu(visibility(pub), context(suffix(false)))]
pub enum Error {
    /// Failed to connect to the key-value store.
    #[snafu(display("Failed to connect to store {:?}. Error {}", endpoints, source))]
    Connect {
        endpoints: Vec<String>,
        source: etcd_client::Error,
    },
    /// No endpoints were given to connect to.
    #[snafu(display("No store endpoints specified"))]
    NoEndpoints,
    /// Failed to read the CA certificate bundle used to validate the store.
    #[snafu(display("Failed to read CA certificate '{}'. Error {}", path.display(), source))]
    CaCertificate {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to 'put' an entry in the store.
    #[snafu(display("Failed to 'put' entry with key {}. Error {}", key, source))]
    Put {
        key: String,
        source: etcd_client::Error,
    },
    /// Failed to 'get' entries from the store.
    #[snafu(display("Failed to 'get' entries {}. Error {}", selector, source))]
    Get {
        selector: String,
        source: etcd_client::Error,
    },
    /// Failed to 'delete' entries from the store.
    #[snafu(display("Failed to 'delete' entries {}. Error {}", selector, source))]
    Delete {
        selector: String,
        source: etcd_client::Error,
    },
    /// Failed to 'watch' entries in the store.
    #[snafu(display("Failed to 'watch' entries {}. Error {}", selector, source))]
    Watch {
        selector: String,
        source: etcd_client::Error,
    },
    /// The watch stream failed after being established.
    #[snafu(display("Watch stream for {} failed. Error {}", selector, source))]
    WatchStream {
        selector: String,
        source: etcd_client::Error,
    },
    /// The store cancelled the watch.
    #[snafu(display("Watch for {} cancelled by the store, reason: '{}'", selector, reason))]
    WatchCancelled { selector: String, reason: String },
    /// Failed to run operation within a timeout.
    #[snafu(display("Timed out during {} operation after {:?}", operation, timeout))]
    Timeout {
        operation: String,
        timeout: std::time::Duration,
    },
    /// The worker pool no longer accepts tasks.
    #[snafu(display("Worker pool is shutdown"))]
    PoolShutdown,
    /// A task running on the worker pool panicked before producing its result.
    #[snafu(display("Task aborted on the worker pool"))]
    TaskAborted,
    /// A background task panicked or was cancelled.
    #[snafu(display("Failed to join {} task. Error {}", task, source))]
    TaskJoin {
        task: String,
        source: tokio::task::JoinError,
    },
}
