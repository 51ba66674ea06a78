//! Registry Coordinator
//!
//! Service registry and coordination plane for a fleet of microservices:
//! refresh/eviction/change-propagation/dependency-coverage over a
//! Redis-compatible store, fronted by a JSON-over-HTTP RPC facade.

use clap::{Parser, Subcommand};
use registry_coordinator::config::{ConfigLoader, RawConfig};
use registry_coordinator::daemon::{wait_for_shutdown, ShutdownHandle};
use registry_coordinator::dependency::alert::WebhookAlerter;
use registry_coordinator::propagate::outbound::HttpOutboundRpc;
use registry_coordinator::propagate::{AlertQueue, ChangeQueue};
use registry_coordinator::rpc::http::{rpc_router, RpcState};
use registry_coordinator::store::RedisStoreAdapter;
use registry_coordinator::{dependency, liveness, metrics, propagate, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "registry-coordinator")]
#[command(about = "Service registry and coordinator for a fleet of microservices", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "REGISTRY_COORDINATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REGISTRY_COORDINATOR_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Admin/RPC bind address
    #[arg(long)]
    bind_ip: Option<String>,

    /// Admin/RPC bind port
    #[arg(long)]
    bind_port: Option<u16>,

    /// Process nicename used in alert titles and logs
    #[arg(long)]
    nicename: Option<String>,

    /// Process name reported in logs
    #[arg(long)]
    process_name: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and exit
    Validate {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Some(Commands::Validate { config: path }) = &cli.command {
        return match RawConfig::from_file(path) {
            Ok(_) => {
                println!("configuration valid");
                Ok(())
            }
            Err(e) => {
                eprintln!("configuration invalid: {e}");
                std::process::exit(1);
            }
        };
    }

    let config_path = match cli.config {
        Some(path) => path,
        None => {
            eprintln!("--config is required to run the coordinator");
            std::process::exit(1);
        }
    };

    let loader = ConfigLoader::new(config_path)?.watch()?;
    let config = loader.handle();
    let snapshot = config.load();

    info!(
        nicename = cli.nicename.as_deref().unwrap_or(snapshot.server.nicename.as_str()),
        process_name = cli.process_name.as_deref().unwrap_or(snapshot.server.process_name.as_str()),
        "registry-coordinator v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let store = Arc::new(RedisStoreAdapter::new(&snapshot.redis_list).await?);
    let outbound = Arc::new(HttpOutboundRpc::default());
    let alerter: Arc<dyn dependency::alert::Alerter> = match &snapshot.lark_webhook {
        Some(url) => Arc::new(WebhookAlerter::new(url.clone())),
        None => {
            tracing::warn!("no lark_webhook configured, alerts will fail delivery");
            Arc::new(WebhookAlerter::new(String::new()))
        }
    };

    let (change_queue, change_rx) = ChangeQueue::new();
    let (alert_queue, alert_rx) = AlertQueue::new();
    let shutdown = ShutdownHandle::new();

    tokio::spawn(liveness::run(store.clone(), config.clone(), change_queue.clone(), shutdown.subscribe()));
    tokio::spawn(dependency::run(store.clone(), config.clone(), alerter.clone(), shutdown.subscribe()));
    tokio::spawn(propagate::run_change_drain(store.clone(), outbound.clone(), change_queue.clone(), change_rx, shutdown.subscribe()));
    tokio::spawn(propagate::run_alert_drain(alerter.clone(), alert_queue.clone(), alert_rx, shutdown.subscribe()));

    let rpc_state = RpcState { store: store.clone(), config: config.clone(), change_queue, alert_queue, outbound, alerter };
    let bind_ip = cli.bind_ip.unwrap_or_else(|| snapshot.server.bind_ip.clone());
    let bind_port = cli.bind_port.unwrap_or(snapshot.server.bind_port);

    let app = rpc_router(rpc_state).merge(metrics::admin_router());
    let addr = format!("{bind_ip}:{bind_port}")
        .parse::<std::net::SocketAddr>()
        .map_err(|e| registry_coordinator::Error::Internal(format!("invalid bind address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| registry_coordinator::Error::Internal(format!("failed to bind {addr}: {e}")))?;

    info!(%addr, "rpc facade listening");

    let shutdown_signal = shutdown.clone();
    tokio::spawn(wait_for_shutdown(shutdown_signal));
    let mut shutdown_rx = shutdown.subscribe();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("rpc facade shutting down");
        })
        .await
        .map_err(|e| registry_coordinator::Error::Internal(format!("server error: {e}")))?;

    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
