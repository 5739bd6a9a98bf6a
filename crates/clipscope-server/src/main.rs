//! Clipscope Server
//!
//! Serves the checkpoint comparison API and the bundled front-end.

use anyhow::Result;
use clap::Parser;
use clipscope_server::{build_workbench, run_server, AppState, Cli, ServerConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    info!("Starting Clipscope server");

    // Load configuration
    let config = ServerConfig::load(&cli.config, &cli)?;
    info!("Configuration loaded successfully");
    info!("Checkpoints: {}", config.models.checkpoints.len());
    info!("Models root: {}", config.models.models_root.display());
    info!("Device: {:?}", config.models.device);

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    // Loading weights blocks, so keep it off the runtime threads
    info!("Initializing workbench...");
    let models = config.models.clone();
    let mock = config.mock;
    let workbench = tokio::task::spawn_blocking(move || build_workbench(&models, mock)).await??;

    let state = AppState::new(workbench, config.frontend_dir.clone()).with_metrics(metrics_handle);
    let addr = config.socket_addr()?;

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    run_server(state, addr, shutdown).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("clipscope=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("clipscope=info,tower_http=warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "clipscope_predictions_total",
        "Total number of predictions served by mode"
    );
    metrics::describe_counter!(
        "clipscope_model_loads_total",
        "Total number of checkpoint loads by outcome"
    );
    metrics::describe_counter!("clipscope_errors_total", "Total number of errors by kind");
    metrics::describe_histogram!(
        "clipscope_prediction_latency_us",
        metrics::Unit::Microseconds,
        "Single-model scoring latency in microseconds"
    );
    metrics::describe_histogram!(
        "clipscope_model_load_latency_ms",
        metrics::Unit::Milliseconds,
        "Checkpoint load latency in milliseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
