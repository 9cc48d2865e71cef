use crate::{
    api::{
        KeySelector, KeyValue, RangeResult, Store, StoreKey, StoreKv, StoreValue, WatchEvent,
        WatchUpdate,
    },
    error::{CaCertificate, Connect, Delete, Error, Get, Put, Watch},
    watch::StoreWatch,
};
use async_trait::async_trait;
use etcd_client::{
    Certificate, Client, ConnectOptions, DeleteOptions, EventType, GetOptions, TlsOptions,
    WatchOptions, WatchStream, Watcher,
};
use snafu::ResultExt;
use std::{future::Future, path::PathBuf, time::Duration};
use tokio::sync::{
    mpsc::{channel, Sender},
    oneshot,
};

/// Default timeout for every store operation.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for establishing the connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// How the certificate presented by the etcd endpoints is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicy {
    /// No TLS, the channel is not secured.
    Plaintext,
    /// TLS, validated against the platform's trusted roots.
    NativeRoots {
        /// Server name to validate, if it differs from the endpoint host.
        domain: Option<String>,
    },
    /// TLS, validated against a deployment specific CA bundle in PEM format.
    CaCertificate {
        path: PathBuf,
        /// Server name to validate, if it differs from the endpoint host.
        domain: Option<String>,
    },
}
impl TrustPolicy {
    async fn tls_options(&self) -> Result<Option<TlsOptions>, Error> {
        let (tls, domain) = match self {
            Self::Plaintext => return Ok(None),
            Self::NativeRoots { domain } => (TlsOptions::new(), domain),
            Self::CaCertificate { path, domain } => {
                let pem = tokio::fs::read(path)
                    .await
                    .context(CaCertificate { path: path.clone() })?;
                (
                    TlsOptions::new().ca_certificate(Certificate::from_pem(pem)),
                    domain,
                )
            }
        };
        Ok(Some(match domain {
            Some(domain) => tls.domain_name(domain.clone()),
            None => tls,
        }))
    }
}

/// Connection parameters for `Etcd`.
#[derive(Clone)]
pub struct EtcdConfig {
    endpoints: Vec<String>,
    credentials: Option<(String, String)>,
    trust: TrustPolicy,
    op_timeout: Duration,
    connect_timeout: Duration,
    keep_alive: Option<(Duration, Duration)>,
}
impl std::fmt::Debug for EtcdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdConfig")
            .field("endpoints", &self.endpoints)
            .field("user", &self.credentials.as_ref().map(|(user, _)| user))
            .field("trust", &self.trust)
            .field("op_timeout", &self.op_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}
impl EtcdConfig {
    /// New config for a comma separated list of endpoints.
    /// Endpoints without a scheme use http, or https if a TLS trust policy is set.
    pub fn for_endpoints(endpoints: &str) -> Self {
        Self {
            endpoints: endpoints
                .split(',')
                .map(str::trim)
                .filter(|endpoint| !endpoint.is_empty())
                .map(ToString::to_string)
                .collect(),
            credentials: None,
            trust: TrustPolicy::Plaintext,
            op_timeout: DEFAULT_OP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_alive: None,
        }
    }
    /// Authenticate with the given user and password.
    pub fn with_credentials(self, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((user.into(), password.into())),
            ..self
        }
    }
    /// Specify how the endpoints' certificates are validated.
    pub fn with_trust(self, trust: TrustPolicy) -> Self {
        Self { trust, ..self }
    }
    /// Specify the timeout for each store operation.
    pub fn with_op_timeout(self, op_timeout: Duration) -> Self {
        Self { op_timeout, ..self }
    }
    /// Specify the connection timeout.
    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }
    /// Enable http2 keep alives with the given interval and timeout.
    pub fn with_keep_alive(self, interval: Duration, timeout: Duration) -> Self {
        Self {
            keep_alive: Some((interval, timeout)),
            ..self
        }
    }
    /// The endpoints to connect to.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
    /// The trust policy.
    pub fn trust(&self) -> &TrustPolicy {
        &self.trust
    }

    async fn connect_options(&self) -> Result<ConnectOptions, Error> {
        let mut options = ConnectOptions::new()
            .with_connect_timeout(self.connect_timeout)
            .with_timeout(self.op_timeout);
        if let Some((user, password)) = &self.credentials {
            options = options.with_user(user.clone(), password.clone());
        }
        if let Some((interval, timeout)) = self.keep_alive {
            options = options.with_keep_alive(interval, timeout);
        }
        if let Some(tls) = self.trust.tls_options().await? {
            options = options.with_tls(tls);
        }
        Ok(options)
    }
}

/// etcd client
#[derive(Clone)]
pub struct Etcd {
    client: Client,
    op_timeout: Duration,
}

impl std::fmt::Debug for Etcd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Etcd")
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl Etcd {
    /// Create a new instance of the etcd client for a single plaintext endpoint.
    pub async fn new(endpoint: &str) -> Result<Etcd, Error> {
        Self::connect(&EtcdConfig::for_endpoints(endpoint)).await
    }
    /// Connect to the etcd cluster described by `config`.
    /// When credentials are given they are verified as part of the connection.
    pub async fn connect(config: &EtcdConfig) -> Result<Etcd, Error> {
        if config.endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }
        let options = config.connect_options().await?;
        tracing::debug!(endpoints = ?config.endpoints, trust = ?config.trust, "Connecting to etcd");

        let client = Client::connect(config.endpoints.as_slice(), Some(options))
            .await
            .context(Connect {
                endpoints: config.endpoints.clone(),
            })?;
        Ok(Etcd {
            client,
            op_timeout: config.op_timeout,
        })
    }
}

/// Run the store operation, failing with `Error::Timeout` if it does not complete in time.
async fn timed<T>(
    operation: &str,
    timeout: Duration,
    future: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            timeout,
        }),
    }
}

#[async_trait]
impl StoreKv for Etcd {
    /// 'Put' a key-value pair into etcd.
    async fn put_kv<K: StoreKey, V: StoreValue>(&mut self, key: K, value: V) -> Result<(), Error> {
        let key = key.into();
        let key_str = String::from_utf8_lossy(&key).to_string();
        let client = &mut self.client;
        timed("put", self.op_timeout, async move {
            client
                .put(key, value, None)
                .await
                .context(Put { key: key_str })
        })
        .await?;
        Ok(())
    }

    /// 'Get' the entries matched by the selector from etcd.
    async fn get_kv(&mut self, selector: &KeySelector) -> Result<RangeResult, Error> {
        let options = match selector {
            KeySelector::Key(_) => None,
            KeySelector::Prefix(_) => Some(GetOptions::new().with_prefix()),
            KeySelector::AllKeys => Some(GetOptions::new().with_all_keys()),
        };
        let client = &mut self.client;
        let resp = timed("get", self.op_timeout, async move {
            client
                .get(selector.key_bytes(), options)
                .await
                .context(Get {
                    selector: selector.to_string(),
                })
        })
        .await?;

        Ok(RangeResult {
            revision: resp.header().map(|h| h.revision()).unwrap_or_default(),
            kvs: resp.kvs().iter().map(KeyValue::from).collect(),
            count: resp.count().max(0) as u64,
        })
    }

    /// 'Delete' the entries matched by the selector from etcd.
    async fn delete_kv(&mut self, selector: &KeySelector) -> Result<u64, Error> {
        let options = match selector {
            KeySelector::Key(_) => None,
            KeySelector::Prefix(_) => Some(DeleteOptions::new().with_prefix()),
            KeySelector::AllKeys => Some(DeleteOptions::new().with_all_keys()),
        };
        let client = &mut self.client;
        let resp = timed("delete", self.op_timeout, async move {
            client
                .delete(selector.key_bytes(), options)
                .await
                .context(Delete {
                    selector: selector.to_string(),
                })
        })
        .await?;
        Ok(resp.deleted().max(0) as u64)
    }

    /// 'Watch' the etcd entries matched by the selector.
    /// Only changes made after the watch is established are reported.
    async fn watch_kv(&mut self, selector: &KeySelector) -> Result<StoreWatch, Error> {
        let options = match selector {
            KeySelector::Key(_) => None,
            KeySelector::Prefix(_) => Some(WatchOptions::new().with_prefix()),
            KeySelector::AllKeys => Some(WatchOptions::new().with_all_keys()),
        };
        let client = &mut self.client;
        let (watcher, stream) = timed("watch", self.op_timeout, async move {
            client
                .watch(selector.key_bytes(), options)
                .await
                .context(Watch {
                    selector: selector.to_string(),
                })
        })
        .await?;

        let (sender, receiver) = channel(100);
        let (cancel, cancelled) = oneshot::channel();
        watch(selector.clone(), watcher, stream, sender, cancelled);
        Ok(StoreWatch::new(selector.clone(), receiver, cancel))
    }
}

#[async_trait]
impl Store for Etcd {
    async fn online(&mut self) -> bool {
        match tokio::time::timeout(self.op_timeout, self.client.status()).await {
            Ok(Ok(_)) => true,
            Ok(Err(error)) => {
                tracing::debug!(%error, "etcd status request failed");
                false
            }
            Err(_) => {
                tracing::debug!(timeout = ?self.op_timeout, "etcd status request timed out");
                false
            }
        }
    }
}

/// Watch for events in the key-value store.
/// Each non-empty watch response is sent over the channel as a `WatchUpdate`.
/// The watch stops when it's cancelled, when the receiver is closed or when the stream fails.
fn watch(
    selector: KeySelector,
    mut watcher: Watcher,
    mut stream: WatchStream,
    sender: Sender<Result<WatchUpdate, Error>>,
    mut cancelled: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                // a dropped cancel handle also stops the watch
                _ = &mut cancelled => {
                    if let Err(error) = watcher.cancel().await {
                        tracing::warn!(%selector, %error, "Failed to cancel the watch");
                    }
                    return;
                }
                message = stream.message() => message,
            };
            let response = match message {
                Ok(Some(resp)) => resp,
                // stream cancelled
                Ok(None) => return,
                Err(source) => {
                    tracing::error!(%selector, error = %source, "Failed to get watch message");
                    let _ = sender
                        .send(Err(Error::WatchStream {
                            selector: selector.to_string(),
                            source,
                        }))
                        .await;
                    return;
                }
            };

            if response.canceled() {
                let reason = response.cancel_reason();
                if !reason.is_empty() {
                    let _ = sender
                        .send(Err(Error::WatchCancelled {
                            selector: selector.to_string(),
                            reason: reason.to_string(),
                        }))
                        .await;
                }
                return;
            }

            let events = response
                .events()
                .iter()
                .filter_map(|event| {
                    let kv = KeyValue::from(event.kv()?);
                    Some(match event.event_type() {
                        EventType::Put => WatchEvent::Put(kv),
                        EventType::Delete => WatchEvent::Delete(kv),
                    })
                })
                .collect::<Vec<_>>();
            // creation acks and progress notifications carry no events
            if events.is_empty() {
                continue;
            }

            let update = WatchUpdate {
                revision: response.header().map(|h| h.revision()).unwrap_or_default(),
                events,
            };
            if sender.send(Ok(update)).await.is_err() {
                // Send only fails if the receiver is closed, so just stop watching.
                watcher.cancel().await.ok();
                return;
            }
        }
    });
}
