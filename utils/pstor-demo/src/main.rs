mod printer;
mod walkthrough;

use crate::{
    printer::{OutputFormat, Printer},
    walkthrough::{Cleanup, Walkthrough, WalkthroughArgs},
};
use clap::Parser;
use pstor::{
    etcd::{Etcd, EtcdConfig, TrustPolicy},
    memory::MemStore,
    WorkerPool,
};
use std::path::PathBuf;
use utils::tracing_telemetry::{FmtLayer, FmtStyle, TracingTelemetry};

/// Walks through the store operations: connect, put, get, watch, delete.
#[derive(Debug, Parser)]
#[clap(version = utils::version_info_str!())]
pub(crate) struct CliArgs {
    /// The Persistent Store URLs to connect to, comma separated.
    /// (supports the http/https schema)
    #[clap(long, short, env = "ETCD_ENDPOINTS", default_value = utils::DEFAULT_STORE_ENDPOINTS)]
    endpoints: String,

    /// The user to authenticate as.
    #[clap(long, short, env = "ETCD_USER", requires = "password")]
    user: Option<String>,

    /// The password of the user.
    #[clap(long, env = "ETCD_PASSWORD", hide_env_values = true, requires = "user")]
    password: Option<String>,

    /// PEM bundle of the CA which signed the store's certificates.
    /// Enables TLS.
    #[clap(long, env = "ETCD_CA_CERT", conflicts_with = "native_roots")]
    ca_cert: Option<PathBuf>,

    /// Validate the store's certificates against the platform's trusted roots.
    /// Enables TLS.
    #[clap(long)]
    native_roots: bool,

    /// The server name expected in the store's certificates, if it differs from the
    /// endpoint host.
    #[clap(long, env = "ETCD_TLS_DOMAIN")]
    tls_domain: Option<String>,

    /// The timeout for store operations.
    #[clap(long, default_value = utils::STORE_OP_TIMEOUT)]
    store_timeout: humantime::Duration,

    /// The timeout for establishing the store connection.
    #[clap(long, default_value = utils::STORE_CONN_TIMEOUT)]
    connect_timeout: humantime::Duration,

    /// Run against an embedded in-memory store rather than etcd.
    #[clap(long, conflicts_with_all = ["user", "ca_cert", "native_roots"])]
    in_memory: bool,

    /// Number of workers running the watch and completion callbacks.
    #[clap(long, default_value = utils::DEFAULT_WORKER_POOL_SIZE)]
    workers: usize,

    /// How long to let asynchronous notifications settle between steps.
    #[clap(long, default_value = utils::DEFAULT_SETTLE_PERIOD)]
    settle: humantime::Duration,

    /// The key which is written and read back.
    #[clap(long, default_value = "hello")]
    key: String,

    /// The prefix under which the bulk writes go.
    #[clap(long, default_value = "/hello/")]
    prefix: String,

    /// Number of bulk writes under the prefix.
    #[clap(long, default_value = "99")]
    count: u32,

    /// Which keys to delete at the end: all, prefix or none.
    #[clap(long, default_value = "all")]
    cleanup: Cleanup,

    /// How to print the read results: plain, table or json.
    #[clap(long, default_value = "plain")]
    format: OutputFormat,

    /// Formatting style to be used while logging: compact, pretty or json.
    #[clap(long, default_value = "compact")]
    fmt_style: FmtStyle,

    /// Use ANSI colors for the logs.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    ansi_colours: bool,
}
impl CliArgs {
    fn args() -> Self {
        CliArgs::parse()
    }

    /// The trust policy selected by the TLS arguments.
    fn trust(&self) -> TrustPolicy {
        let domain = self.tls_domain.clone();
        match (&self.ca_cert, self.native_roots) {
            (Some(path), _) => TrustPolicy::CaCertificate {
                path: path.clone(),
                domain,
            },
            (None, true) => TrustPolicy::NativeRoots { domain },
            (None, false) => TrustPolicy::Plaintext,
        }
    }

    /// The etcd connection parameters.
    fn etcd_config(&self) -> EtcdConfig {
        let config = EtcdConfig::for_endpoints(&self.endpoints)
            .with_trust(self.trust())
            .with_op_timeout(self.store_timeout.into())
            .with_connect_timeout(self.connect_timeout.into());
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => config.with_credentials(user, password),
            _ => config,
        }
    }

    fn walkthrough_args(&self) -> WalkthroughArgs {
        WalkthroughArgs {
            key: self.key.clone(),
            prefix: self.prefix.clone(),
            count: self.count,
            settle: self.settle.into(),
            cleanup: self.cleanup,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli_args = CliArgs::args();
    TracingTelemetry::builder()
        .with_writer(FmtLayer::Stderr)
        .with_style(cli_args.fmt_style)
        .with_colours(cli_args.ansi_colours)
        .init("pstor-demo")?;
    tracing::info!("{}", utils::fmt_package_info!());

    walkthrough(&cli_args, Printer::stdout(cli_args.format)).await
}

/// Run the walkthrough between the `Starting` and `Done` lines, or until interrupted.
async fn walkthrough(cli_args: &CliArgs, printer: Printer) -> anyhow::Result<()> {
    printer.line("Starting");

    match shutdown::Shutdown::race(run(cli_args, printer.clone())).await {
        Ok(result) => result?,
        Err(signal) => {
            tracing::warn!(?signal, "Walkthrough interrupted");
            anyhow::bail!("Interrupted by {signal:?}");
        }
    }

    printer.line("Done");
    Ok(())
}

async fn run(cli_args: &CliArgs, printer: Printer) -> anyhow::Result<()> {
    let pool = WorkerPool::new(cli_args.workers);
    let args = cli_args.walkthrough_args();

    if cli_args.in_memory {
        tracing::info!("Using the embedded in-memory store");
        return Walkthrough::new(MemStore::new(), pool, printer, args)
            .run()
            .await;
    }

    let config = cli_args.etcd_config();
    tracing::info!(?config, "Connecting to the store");
    let store = Etcd::connect(&config).await.map_err(|error| {
        tracing::error!(%error, "Failed to connect to the store");
        error
    })?;
    Walkthrough::new(store, pool, printer, args).run().await
}
