//! registry-mirror-gateway - A Host-routed mirror gateway for container registries
//!
//! This is the main entry point for the registry-mirror-gateway application.

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use registry_mirror_gateway::config::Config;
use registry_mirror_gateway::otel::{init_tracing, Metrics, OtelProvider};
use registry_mirror_gateway::registry::RouteTable;
use registry_mirror_gateway::server::{AppState, Server};

/// registry-mirror-gateway - A Host-routed mirror gateway for container registries
#[derive(Parser, Debug)]
#[command(name = "registry-mirror-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "MIRROR_GATEWAY_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging.level, &config.logging.format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting registry-mirror-gateway"
    );

    for route in RouteTable::from_config(&config.gateway).routes() {
        info!(host = %route.host, upstream = %route.upstream, "Mirror route");
    }
    if config.gateway.is_debug() {
        info!(
            upstream = %config.gateway.debug_upstream(),
            "Debug mode: unknown hosts are passed through"
        );
    }

    let metrics = Metrics::new(&otel_provider.meter());
    let state = AppState::new(config.clone(), metrics)?;

    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("registry-mirror-gateway shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
