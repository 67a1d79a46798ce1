//! Catalogue of anomaly types and severity levels
//!
//! Threshold text is rendered from the active thresholds so the catalogue
//! always describes what the engine actually checks.

use serde::Serialize;

use crate::anomaly::{HIGH_BURST_COUNT, HIGH_ERROR_RATE, MIN_LOGS_FOR_ERROR_RATE};
use crate::models::{AnomalyType, MetricKind, Severity};
use crate::thresholds::AnomalyThresholds;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyTypeInfo {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub description: &'static str,
    pub severity_levels: Vec<Severity>,
    pub threshold: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityLevelInfo {
    pub severity: Severity,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyCatalog {
    pub anomaly_types: Vec<AnomalyTypeInfo>,
    pub severity_levels: Vec<SeverityLevelInfo>,
}

impl AnomalyCatalog {
    pub fn new(thresholds: &AnomalyThresholds) -> Self {
        Self {
            anomaly_types: anomaly_types(thresholds),
            severity_levels: severity_levels(),
        }
    }
}

/// One entry per anomaly type, in declaration order
pub fn anomaly_types(thresholds: &AnomalyThresholds) -> Vec<AnomalyTypeInfo> {
    AnomalyType::ALL
        .into_iter()
        .map(|anomaly_type| describe(anomaly_type, thresholds))
        .collect()
}

pub fn severity_levels() -> Vec<SeverityLevelInfo> {
    vec![
        SeverityLevelInfo {
            severity: Severity::Low,
            description: "Minor issues that should be monitored",
        },
        SeverityLevelInfo {
            severity: Severity::Medium,
            description: "Moderate issues that may require attention",
        },
        SeverityLevelInfo {
            severity: Severity::High,
            description: "Critical issues that require immediate attention",
        },
    ]
}

fn metric_threshold(metric: MetricKind, t: &AnomalyThresholds) -> String {
    let mut text = format!(
        "z-score >= {} or {}% increase from baseline",
        t.zscore_for(metric),
        t.percent_for(metric)
    );
    if let Some(limit) = t.absolute_for(metric) {
        text.push_str(&format!(" or {} new connections", limit));
    }
    text
}

fn describe(anomaly_type: AnomalyType, t: &AnomalyThresholds) -> AnomalyTypeInfo {
    let all_levels = Severity::ALL.to_vec();

    let (description, severity_levels, threshold) = match anomaly_type {
        AnomalyType::CpuSpike => (
            "Sudden increase in CPU usage",
            all_levels,
            metric_threshold(MetricKind::Cpu, t),
        ),
        AnomalyType::MemorySpike => (
            "Sudden increase in memory usage",
            all_levels,
            metric_threshold(MetricKind::Memory, t),
        ),
        AnomalyType::DiskSpike => (
            "Sudden increase in disk usage",
            all_levels,
            metric_threshold(MetricKind::Disk, t),
        ),
        AnomalyType::ConnectionSpike => (
            "Sudden increase in TCP connections",
            all_levels,
            metric_threshold(MetricKind::TcpConnections, t),
        ),
        AnomalyType::IpRequestSpike => (
            "Too many requests from a single public IP address",
            vec![Severity::Medium, Severity::High],
            format!(
                "more than {} requests in the window (HIGH above {})",
                t.ip_request_threshold, HIGH_BURST_COUNT
            ),
        ),
        AnomalyType::HighErrorRate => (
            "High error rate in a container's logs",
            vec![Severity::Medium, Severity::High],
            format!(
                "error rate above {}% with at least {} log lines (HIGH above {}%)",
                t.error_rate_threshold, MIN_LOGS_FOR_ERROR_RATE, HIGH_ERROR_RATE
            ),
        ),
        AnomalyType::ContainerRestartLoop => (
            "Container restarting frequently",
            vec![Severity::High],
            format!(
                "more than {} restarts in the window",
                t.container_restart_threshold
            ),
        ),
        AnomalyType::HighEventVolume => (
            "High volume of lifecycle events",
            vec![Severity::Medium],
            format!("more than {} events in the window", t.event_volume_threshold),
        ),
    };

    AnomalyTypeInfo {
        anomaly_type,
        description,
        severity_levels,
        threshold,
    }
}
