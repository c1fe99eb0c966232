use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voicebridge::application::CallService;
use voicebridge::config::Config;
use voicebridge::interface::api::{build_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting VoiceBridge");

    // Load configuration
    let config = Config::load()?;
    info!(
        outbound = ?config.outbound.mode,
        recording_dir = %config.recording.directory.display(),
        "Configuration loaded"
    );

    // Initialize metrics
    let prometheus_handle = match init_metrics() {
        Ok(handle) => {
            info!("Prometheus metrics initialized");
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Metrics disabled");
            None
        }
    };

    let calls = Arc::new(CallService::from_config(&config)?);
    let app = build_router(AppState::new(calls.clone()), prometheus_handle);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("HTTP server listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let closed = calls.shutdown().await;
    info!(closed, "VoiceBridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
}
