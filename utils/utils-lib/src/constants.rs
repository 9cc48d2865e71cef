//! Various common constants used by the store tooling.

/// The etcd endpoints used when none are specified.
pub const DEFAULT_STORE_ENDPOINTS: &str = "http://localhost:2379";

/// The timeout for all persistent store operations.
pub const STORE_OP_TIMEOUT: &str = "5s";

/// Default connection timeout for the store channel.
pub const STORE_CONN_TIMEOUT: &str = "1s";

/// Number of workers which run the watch and completion callbacks.
pub const DEFAULT_WORKER_POOL_SIZE: &str = "10";

/// How long to let asynchronous operations settle between steps.
pub const DEFAULT_SETTLE_PERIOD: &str = "1s";

/// The tracing filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info";
