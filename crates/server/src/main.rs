//! Anomaly Server - statistical anomaly detection over fleet telemetry
//!
//! Loads thresholds and a telemetry snapshot at startup, then answers
//! anomaly queries over HTTP until interrupted.

use anomaly_engine::{
    health::{components, HealthRegistry},
    AnomalyEngine, AnomalyThresholds, InMemoryStore, StructuredLogger,
};
use anomaly_server::{api, config::ServerConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting anomaly-server");

    let config = ServerConfig::load()?;
    let thresholds = AnomalyThresholds::load().context("Failed to load anomaly thresholds")?;
    info!(instance = %config.instance_name, "Server configured");

    let health_registry = HealthRegistry::new();
    health_registry.register_detectors().await;
    health_registry.register(components::TELEMETRY_STORE).await;

    let store = match &config.data_file {
        Some(path) => InMemoryStore::load_json(path)
            .with_context(|| format!("Failed to load telemetry snapshot {}", path.display()))?,
        None => {
            health_registry
                .set_degraded(components::TELEMETRY_STORE, "No telemetry snapshot configured")
                .await;
            InMemoryStore::new()
        }
    };
    info!(
        logs = store.log_count(),
        events = store.event_count(),
        "Telemetry store loaded"
    );

    let logger = StructuredLogger::new(&config.instance_name);
    let engine = AnomalyEngine::new(Arc::new(store), thresholds)
        .with_query_timeout(config.query_timeout())
        .with_logger(logger.clone());

    let app_state = Arc::new(api::AppState::new(Arc::new(engine), health_registry.clone()));
    health_registry.set_ready(true).await;

    let addr = format!("0.0.0.0:{}", config.api_port);
    logger.log_startup(SERVER_VERSION, &addr);

    let shutdown_logger = logger.clone();
    api::serve(config.api_port, app_state, async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown_logger.log_shutdown("SIGINT received"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await
            }
        }
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
