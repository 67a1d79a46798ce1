//! Detector health and readiness
//!
//! Each detector is a component whose health follows the outcome of the
//! detection runs: a run with failures degrades it, repeated failed runs
//! make it unhealthy, and a clean run restores it. Other components (the
//! telemetry store) are set explicitly by the server.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::engine::{DetectionReport, DetectorKind};

/// Consecutive failed runs after which a detector is unhealthy
pub const UNHEALTHY_AFTER_FAILED_RUNS: u32 = 3;

/// Health of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Some queries fail; the remaining detectors still report
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Detection runs in a row in which this component failed
    #[serde(default, skip_serializing_if = "is_zero")]
    pub consecutive_failures: u32,
    pub last_check: DateTime<Utc>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>, consecutive_failures: u32) -> Self {
        Self {
            status,
            message,
            consecutive_failures,
            last_check: Utc::now(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status over all components
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const METRIC_SPIKE: &str = "metric_spike";
    pub const IP_BURST: &str = "ip_burst";
    pub const ERROR_RATE: &str = "error_rate";
    pub const EVENT: &str = "event";
    pub const TELEMETRY_STORE: &str = "telemetry_store";
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared registry of component health; clones share state
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    /// Register every detector as healthy
    pub async fn register_detectors(&self) {
        for detector in DetectorKind::ALL {
            self.register(detector.as_str()).await;
        }
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    async fn set(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let mut state = self.state.write().await;
        state
            .components
            .insert(name.to_string(), ComponentHealth::new(status, message, 0));
    }

    /// Update detector health from a detection run
    ///
    /// A detector that failed is degraded with its errors joined by "; ",
    /// and unhealthy once it has failed [`UNHEALTHY_AFTER_FAILED_RUNS`] runs
    /// in a row. Detectors without failures are healthy again.
    pub async fn record_report(&self, report: &DetectionReport) {
        let mut state = self.state.write().await;

        for detector in DetectorKind::ALL {
            let errors: Vec<&str> = report
                .failures
                .iter()
                .filter(|f| f.detector == detector)
                .map(|f| f.error.as_str())
                .collect();

            let health = if errors.is_empty() {
                ComponentHealth::new(ComponentStatus::Healthy, None, 0)
            } else {
                let failed_runs = state
                    .components
                    .get(detector.as_str())
                    .map_or(0, |h| h.consecutive_failures)
                    + 1;
                let status = if failed_runs >= UNHEALTHY_AFTER_FAILED_RUNS {
                    ComponentStatus::Unhealthy
                } else {
                    ComponentStatus::Degraded
                };
                ComponentHealth::new(status, Some(errors.join("; ")), failed_runs)
            };

            state.components.insert(detector.as_str().to_string(), health);
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    /// Ready once initialized and while no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if !state.ready {
            Some("Engine not yet initialized".to_string())
        } else {
            state
                .components
                .iter()
                .find(|(_, h)| h.status == ComponentStatus::Unhealthy)
                .map(|(name, _)| format!("Component {} unhealthy", name))
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DetectorFailure;
    use crate::models::MetricKind;

    fn failed_run() -> DetectionReport {
        DetectionReport {
            anomalies: Vec::new(),
            failures: vec![
                DetectorFailure {
                    detector: DetectorKind::MetricSpike,
                    metric: Some(MetricKind::Cpu),
                    error: "store query timed out after 10s".to_string(),
                },
                DetectorFailure {
                    detector: DetectorKind::MetricSpike,
                    metric: Some(MetricKind::Disk),
                    error: "store unavailable: refused".to_string(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let health = HealthRegistry::new().health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_register_detectors() {
        let registry = HealthRegistry::new();
        registry.register_detectors().await;

        let health = registry.health().await;
        assert_eq!(health.components.len(), DetectorKind::ALL.len());
        assert_eq!(
            health.components[components::METRIC_SPIKE].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_failed_detector_is_degraded_then_recovers() {
        let registry = HealthRegistry::new();
        registry.register_detectors().await;

        registry.record_report(&failed_run()).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        let spike = &health.components[components::METRIC_SPIKE];
        assert_eq!(spike.status, ComponentStatus::Degraded);
        assert_eq!(spike.consecutive_failures, 1);
        assert!(spike.message.as_deref().unwrap().contains("; "));
        assert_eq!(
            health.components[components::EVENT].status,
            ComponentStatus::Healthy
        );

        registry.record_report(&DetectionReport::default()).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components[components::METRIC_SPIKE].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_repeated_failures_make_detector_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register_detectors().await;
        registry.set_ready(true).await;

        for _ in 1..UNHEALTHY_AFTER_FAILED_RUNS {
            registry.record_report(&failed_run()).await;
        }
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);

        registry.record_report(&failed_run()).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Component metric_spike unhealthy")
        );
    }

    #[tokio::test]
    async fn test_unhealthy_store_outranks_degraded_detector() {
        let registry = HealthRegistry::new();
        registry.register_detectors().await;
        registry.register(components::TELEMETRY_STORE).await;

        registry.record_report(&failed_run()).await;
        registry
            .set_unhealthy(components::TELEMETRY_STORE, "Snapshot unreadable")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let readiness = HealthRegistry::new().readiness().await;

        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Engine not yet initialized"));
    }

    #[tokio::test]
    async fn test_readiness_ready_when_set() {
        let registry = HealthRegistry::new();
        registry.register(components::TELEMETRY_STORE).await;
        registry
            .set_degraded(components::TELEMETRY_STORE, "No telemetry snapshot configured")
            .await;
        registry.set_ready(true).await;

        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
    }
}
