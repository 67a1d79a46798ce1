//! HTTP API for anomaly queries, health checks and Prometheus metrics

use std::future::Future;
use std::sync::Arc;

use anomaly_engine::{
    health::{ComponentStatus, HealthRegistry},
    AnomalyCatalog, AnomalyEngine, AnomalyFilter, AnomalySummary, AnomalyType, Severity,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

/// Allowed range for `/anomalies?lookback_hours=`
///
/// The upper bound is further capped below the configured baseline hours.
pub const LOOKBACK_HOURS_RANGE: (u32, u32) = (1, 168);

/// Allowed range for `/anomalies/summary?hours=`, capped the same way
pub const SUMMARY_HOURS_RANGE: (u32, u32) = (1, 720);

const DEFAULT_SUMMARY_HOURS: u32 = 24;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnomalyEngine>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(engine: Arc<AnomalyEngine>, health_registry: HealthRegistry) -> Self {
        Self {
            engine,
            health_registry,
        }
    }
}

/// Client errors, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Validate a window length against `range` and the baseline
///
/// A window reaching back to the start of the baseline would leave the
/// metric detectors without baseline samples.
fn hours_in_range(
    name: &str,
    value: u32,
    (min, max): (u32, u32),
    baseline_hours: u32,
) -> Result<u32, ApiError> {
    let max = max.min(baseline_hours.saturating_sub(1));
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::BadRequest(format!(
            "{} must be between {} and {} (baseline covers the last {} hours)",
            name, min, max, baseline_hours
        )))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnomalyQuery {
    #[serde(alias = "lookbackHours")]
    pub lookback_hours: Option<u32>,
    #[serde(alias = "severity_filter")]
    pub severity: Option<String>,
    #[serde(rename = "type", alias = "type_filter")]
    pub anomaly_type: Option<String>,
}

impl AnomalyQuery {
    fn filter(&self) -> Result<AnomalyFilter, ApiError> {
        let severity = self
            .severity
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Severity>())
            .transpose()
            .map_err(|_| ApiError::BadRequest("Invalid severity filter".to_string()))?;

        let anomaly_type = self
            .anomaly_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<AnomalyType>())
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        Ok(AnomalyFilter {
            severity,
            anomaly_type,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub hours: Option<u32>,
}

/// Detect anomalies over the lookback window, optionally filtered
async fn list_anomalies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnomalyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let thresholds = state.engine.thresholds();
    let lookback = hours_in_range(
        "lookback_hours",
        query.lookback_hours.unwrap_or(thresholds.lookback_hours),
        LOOKBACK_HOURS_RANGE,
        thresholds.baseline_hours,
    )?;
    let filter = query.filter()?;

    let report = state.engine.detect_all_with_report(lookback).await;
    state.health_registry.record_report(&report).await;

    Ok(Json(filter.apply(report.anomalies)))
}

/// Counts by type and severity over the last `hours`
///
/// Defaults to 24 hours, or less when the baseline is shorter.
async fn anomaly_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<AnomalySummary>, ApiError> {
    let baseline_hours = state.engine.thresholds().baseline_hours;
    let default_hours = DEFAULT_SUMMARY_HOURS.min(baseline_hours.saturating_sub(1));
    let hours = hours_in_range(
        "hours",
        query.hours.unwrap_or(default_hours),
        SUMMARY_HOURS_RANGE,
        baseline_hours,
    )?;

    let report = state.engine.detect_all_with_report(hours).await;
    state.health_registry.record_report(&report).await;

    Ok(Json(AnomalySummary::from_anomalies(
        &report.anomalies,
        state.engine.now(),
    )))
}

/// Anomaly types with their current thresholds
async fn anomaly_types(State(state): State<Arc<AppState>>) -> Json<AnomalyCatalog> {
    Json(AnomalyCatalog::new(state.engine.thresholds()))
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        ApiError::Internal("failed to encode metrics".to_string())
    })?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/anomalies", get(list_anomalies))
        .route("/anomalies/summary", get(anomaly_summary))
        .route("/anomalies/types", get(anomaly_types))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
