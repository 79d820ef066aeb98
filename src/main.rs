//! drainscale - Scalable Syslog Drain Forwarding
//!
//! One binary, two roles: `scheduler` runs the control plane that
//! reconciles app-to-drain bindings onto the adapter fleet, `adapter` runs
//! the data plane that holds bindings and forwards log envelopes from the
//! aggregator to their drains.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use drainscale::adapter::{
    Balancer, BindingApiServer, BindingStore, ClientManager, ClientManagerOptions, Connector,
    DialOpts, SubscriptionManager,
};
use drainscale::config::tls::build_https_client;
use drainscale::config::{parse_adapter_addrs, Config, ConfigManager};
use drainscale::metrics::{Metrics, OpsServer};
use drainscale::scheduler::{BlacklistRanges, CupsReader, HttpAdapterPool, Orchestrator};
use drainscale::{Result, ShutdownCoordinator};

/// CLI arguments for drainscale
#[derive(Parser, Debug)]
#[command(name = "drainscale")]
#[command(about = "Scalable syslog drain control plane and data plane")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "drainscale.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reconciliation control plane
    Scheduler {
        /// URL of the CUPS provider
        #[arg(long)]
        cups_url: Option<String>,

        /// Comma separated list of adapter IP addresses
        #[arg(long)]
        adapter_ips: Option<String>,

        /// Port of the adapter binding API
        #[arg(long)]
        adapter_port: Option<u16>,

        /// Reconciliation interval, e.g. 15s
        #[arg(long)]
        reconcile_interval: Option<String>,
    },
    /// Run the data plane adapter
    Adapter {
        /// Comma separated aggregator host:port entries
        #[arg(long)]
        aggregator_addrs: Option<String>,

        /// Number of egress connections to hold
        #[arg(long)]
        pool_size: Option<usize>,

        /// Bind address of the binding API
        #[arg(long)]
        api_bind: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigManager::load_from_file(&cli.config)?;
    if let Some(level) = &cli.log_level {
        config.monitoring.log_level = level.clone();
        config.validate()?;
    }
    init_tracing(&config.monitoring.log_level);

    match cli.command {
        Command::Scheduler {
            cups_url,
            adapter_ips,
            adapter_port,
            reconcile_interval,
        } => {
            config.merge_scheduler_cli_args(
                cups_url.as_deref(),
                adapter_ips.as_deref(),
                adapter_port,
                reconcile_interval.as_deref(),
            )?;
            config.validate()?;
            run_scheduler(config).await
        }
        Command::Adapter {
            aggregator_addrs,
            pool_size,
            api_bind,
        } => {
            config.merge_adapter_cli_args(aggregator_addrs.as_deref(), pool_size, api_bind)?;
            config.validate()?;
            run_adapter(config).await
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_scheduler(config: Config) -> Result<()> {
    let sched = &config.scheduler;
    if sched.cups_url.is_empty() {
        anyhow::bail!("cups_url must be configured to run the scheduler");
    }

    let blacklist = BlacklistRanges::new(sched.blacklist.clone())
        .context("Invalid blacklist configuration")?;
    let adapter_addrs = parse_adapter_addrs(&sched.adapter_ips, sched.adapter_port)?;

    let metrics = Arc::new(Metrics::new());

    let cups_client = build_https_client(sched.cups_tls.as_ref(), sched.request_timeout)?;
    let adapter_client = build_https_client(sched.adapter_tls.as_ref(), sched.request_timeout)?;

    let reader = CupsReader::new(
        cups_client,
        sched.cups_url.clone(),
        blacklist,
        Arc::clone(&metrics),
    );
    let pool = HttpAdapterPool::new(
        adapter_client,
        adapter_addrs.clone(),
        sched.replication_factor,
        sched.adapter_tls.is_some(),
        Arc::clone(&metrics),
    );

    let orchestrator = Arc::new(Orchestrator::new(reader, pool, Arc::clone(&metrics)));

    spawn_ops_server(&config, Arc::clone(&metrics));

    let run_handle = {
        let orchestrator = Arc::clone(&orchestrator);
        let interval = sched.reconcile_interval;
        tokio::spawn(async move { orchestrator.run(interval).await })
    };

    info!(
        cups_url = %sched.cups_url,
        adapters = adapter_addrs.len(),
        interval = ?sched.reconcile_interval,
        "Scheduler started"
    );

    let shutdown = ShutdownCoordinator::new();
    shutdown.listen_for_signals().await?;

    orchestrator.stop();
    run_handle.await?;

    Ok(())
}

async fn run_adapter(config: Config) -> Result<()> {
    let adapter = &config.adapter;

    let metrics = Arc::new(Metrics::new());

    let balancer = Balancer::new(adapter.aggregator_addrs.clone());
    let connector = Connector::new(balancer, DialOpts::default(), Arc::clone(&metrics));
    let clients = Arc::new(ClientManager::new(
        connector,
        adapter.client_pool_size,
        adapter.rotation_interval,
        ClientManagerOptions {
            retry_wait: adapter.retry_wait,
        },
        Arc::clone(&metrics),
    )?);

    let subscriptions = Arc::new(SubscriptionManager::new(
        Arc::clone(&clients),
        adapter.shard_id.clone(),
        adapter.subscription_retry_wait,
        Arc::clone(&metrics),
    ));
    let store = Arc::new(BindingStore::new());

    let api = BindingApiServer::new(
        adapter.api_bind_addr,
        Arc::clone(&store),
        Arc::clone(&subscriptions),
    );
    tokio::spawn(async move {
        if let Err(e) = api.start().await {
            error!(error = %e, "Binding API exited");
        }
    });

    spawn_ops_server(&config, Arc::clone(&metrics));

    info!(
        pool_size = adapter.client_pool_size,
        rotation = ?adapter.rotation_interval,
        api = %adapter.api_bind_addr,
        "Adapter started"
    );

    let shutdown = ShutdownCoordinator::new();
    shutdown.listen_for_signals().await?;

    subscriptions.stop_all();
    clients.stop();

    Ok(())
}

fn spawn_ops_server(config: &Config, metrics: Arc<Metrics>) {
    if let Some(addr) = config.monitoring.ops_bind_addr {
        let server = OpsServer::new(metrics, addr);
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!(error = %e, "Ops server exited");
            }
        });
    }
}
