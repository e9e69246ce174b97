//! CoinWatch Server
//!
//! Relays exchange trades to clients waiting for a price to cross a target.
//! One binary, three roles; run one process per role against a shared Redis.

mod api;
mod config;
mod exchange;
mod roles;
mod server;
mod shutdown;
mod state;

use clap::{Parser, Subcommand};
use coinwatch_core::broker::{RedisBroker, SharedBroker};
use coinwatch_core::utils::wait_for_dependencies;
use config::{ConfigLoader, Overrides};
use shutdown::spawn_shutdown_watch;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// CoinWatch - price target notifications over WebSocket
#[derive(Parser, Debug)]
#[command(name = "coinwatch-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./coinwatch.toml")]
    config: PathBuf,

    /// Redis connection URI
    #[arg(long, env = "REDIS_URI")]
    redis_uri: Option<String>,

    /// Seconds between broker availability checks at startup
    #[arg(long, env = "DEPENDENCY_RETRY_TIME")]
    dependency_retry_secs: Option<u64>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Serve client WebSocket connections
    Api {
        /// Override the listen address (e.g., 0.0.0.0:9090)
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Stream exchange trades into the pipeline
    Ingest,
    /// Evaluate ticks against watched price targets
    Watch,
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::Api { .. } => "api",
            Role::Ingest => "ingest",
            Role::Watch => "watch",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!(
        role = args.role.name(),
        "Starting coinwatch-server v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let listen = match args.role {
        Role::Api { listen } => listen,
        _ => None,
    };
    let config_loader = ConfigLoader::new(
        &args.config,
        Overrides {
            redis_uri: args.redis_uri.clone(),
            dependency_retry_secs: args.dependency_retry_secs,
            listen,
        },
    );
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let mut shutdown_rx = spawn_shutdown_watch();

    // Opening the client does no IO; the probe below does.
    let broker: SharedBroker = Arc::new(RedisBroker::open(&config.redis_uri).map_err(|e| {
        tracing::error!("Invalid Redis URI: {}", e);
        e
    })?);

    tracing::info!("Waiting for broker...");
    if !wait_for_dependencies(broker.as_ref(), config.dependency_retry, &mut shutdown_rx).await {
        tracing::info!("Shutdown requested before dependencies became available");
        return Ok(());
    }

    let result = match args.role {
        Role::Api { .. } => roles::run_api(&config, broker, shutdown_rx).await,
        Role::Ingest => roles::run_ingest(&config, broker, shutdown_rx).await,
        Role::Watch => roles::run_watch(&config, broker, shutdown_rx).await,
    };

    match &result {
        Ok(()) => tracing::info!("Server shutdown complete"),
        Err(e) => tracing::error!("Server stopped: {:#}", e),
    }
    result
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,coinwatch_core=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
