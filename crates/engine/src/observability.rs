//! Observability infrastructure for the anomaly engine
//!
//! Provides:
//! - Prometheus metrics (detection latency, anomalies by type and severity,
//!   detector failures, skipped metrics)
//! - Structured JSON logging with tracing

use prometheus::{register_histogram, register_int_counter_vec, Histogram, IntCounterVec};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{Anomaly, MetricKind, Severity};

/// Histogram buckets for detection run latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    detection_latency_seconds: Histogram,
    anomalies_detected: IntCounterVec,
    detector_failures: IntCounterVec,
    metrics_skipped: IntCounterVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            detection_latency_seconds: register_histogram!(
                "anomaly_engine_detection_latency_seconds",
                "Time spent running a full detection pass",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detection_latency_seconds"),

            anomalies_detected: register_int_counter_vec!(
                "anomaly_engine_anomalies_detected_total",
                "Total number of anomalies detected",
                &["type", "severity"]
            )
            .expect("Failed to register anomalies_detected"),

            detector_failures: register_int_counter_vec!(
                "anomaly_engine_detector_failures_total",
                "Total number of detector runs that failed",
                &["detector"]
            )
            .expect("Failed to register detector_failures"),

            metrics_skipped: register_int_counter_vec!(
                "anomaly_engine_metrics_skipped_total",
                "Metrics skipped for insufficient baseline or recent samples",
                &["metric"]
            )
            .expect("Failed to register metrics_skipped"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_detection_latency(&self, duration_secs: f64) {
        self.inner().detection_latency_seconds.observe(duration_secs);
    }

    pub fn inc_anomaly(&self, anomaly: &Anomaly) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[anomaly.anomaly_type.as_str(), anomaly.severity.as_str()])
            .inc();
    }

    pub fn inc_detector_failure(&self, detector: &str) {
        self.inner()
            .detector_failures
            .with_label_values(&[detector])
            .inc();
    }

    pub fn inc_metric_skipped(&self, metric: MetricKind) {
        self.inner()
            .metrics_skipped
            .with_label_values(&[metric.as_str()])
            .inc();
    }
}

/// Structured logger for engine events
///
/// Every record carries an `event` tag and the instance name.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log an anomaly; HIGH severity is logged at warn level
    pub fn log_anomaly(&self, anomaly: &Anomaly) {
        let resource = anomaly.affected_resource.as_deref().unwrap_or("-");
        match anomaly.severity {
            Severity::High => {
                warn!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    anomaly_type = %anomaly.anomaly_type,
                    severity = %anomaly.severity,
                    affected_resource = %resource,
                    confidence = anomaly.confidence,
                    description = %anomaly.description,
                    "High severity anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    anomaly_type = %anomaly.anomaly_type,
                    severity = %anomaly.severity,
                    affected_resource = %resource,
                    confidence = anomaly.confidence,
                    description = %anomaly.description,
                    "Anomaly detected"
                );
            }
        }
    }

    /// Log a detector that failed and was excluded from the merge
    pub fn log_detector_failure(&self, detector: &str, metric: Option<MetricKind>, error: &str) {
        warn!(
            event = "detector_failed",
            instance = %self.instance,
            detector = %detector,
            metric = ?metric.map(|m| m.as_str()),
            error = %error,
            "Detector failed, excluding its results"
        );
    }

    /// Log the outcome of a detection pass
    pub fn log_detection_run(
        &self,
        lookback_hours: u32,
        anomalies: usize,
        failures: usize,
        duration_secs: f64,
    ) {
        info!(
            event = "detection_run",
            instance = %self.instance,
            lookback_hours = lookback_hours,
            anomalies = anomalies,
            failures = failures,
            duration_secs = duration_secs,
            "Detection run completed"
        );
    }

    pub fn log_startup(&self, version: &str, listen_addr: &str) {
        info!(
            event = "server_started",
            instance = %self.instance,
            version = %version,
            listen_addr = %listen_addr,
            "Anomaly server started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Anomaly server shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyDetails, AnomalyType, EventVolumeDetails};

    #[test]
    fn test_engine_metrics_handles_share_registry() {
        let metrics = EngineMetrics::new();
        let other = metrics.clone();

        metrics.observe_detection_latency(0.02);
        other.inc_detector_failure("error_rate");
        other.inc_metric_skipped(MetricKind::Disk);

        let anomaly = Anomaly {
            anomaly_type: AnomalyType::HighEventVolume,
            severity: Severity::Medium,
            timestamp: chrono::Utc::now(),
            description: "High lifecycle event volume: 120 events".to_string(),
            details: AnomalyDetails::EventVolume(EventVolumeDetails {
                total_events: 120,
                top_actions: Vec::new(),
            }),
            affected_resource: None,
            confidence: 1.0,
        };
        metrics.inc_anomaly(&anomaly);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "anomaly_engine_anomalies_detected_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance(), "test-instance");
    }
}
