use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use discovery_client::api;
use discovery_client::config::{config_path, Config};
use discovery_client::health::ReqwestTransport;
use discovery_client::service::DiscoveryHandle;
use shared::types::DiscoveryClientRobot;

fn log_robots(robots: Arc<Vec<DiscoveryClientRobot>>) {
    tracing::info!("Robot list changed: {} robots", robots.len());
    for robot in robots.iter() {
        match robot.addresses.first() {
            Some(best) => tracing::info!(
                "  {} at {}:{} (health: {}, server health: {})",
                robot.name,
                best.ip,
                best.port,
                best.health_status.map(|s| s.as_str()).unwrap_or("unknown"),
                best.server_health_status.map(|s| s.as_str()).unwrap_or("unknown"),
            ),
            None => tracing::info!("  {} (no known address)", robot.name),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("discovery_client=info"))
        )
        .init();

    tracing::info!("Starting discovery-client");

    // Load config
    let path = config_path(std::env::args().nth(1));

    let config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path))?;

    tracing::info!("Loaded config from {}", path);

    let transport = ReqwestTransport::new(config.discovery.request_timeout())?;
    let (discovery, discovery_task) =
        DiscoveryHandle::with_mdns(&config.discovery, transport, log_robots)?;

    discovery.start(config.discovery.client_config())?;

    let app = api::routes::router(api::routes::AppState {
        discovery: discovery.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    if let Err(e) = discovery.shutdown() {
        tracing::error!("Failed to shutdown discovery: {}", e);
    }

    let _ = tokio::join!(discovery_task, server_handle);

    tracing::info!("Shutdown complete");
    Ok(())
}
