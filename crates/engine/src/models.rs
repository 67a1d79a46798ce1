//! Core data models for the anomaly engine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::{BaselineStatistics, TrendAnalysis};

/// A single numeric telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A log line attributed to a container or other resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub resource: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A discrete lifecycle event (start, stop, restart, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    #[serde(default)]
    pub resource: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// Error returned when parsing an enum from its wire name
#[derive(Debug, Clone, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseKindError {
    kind: &'static str,
    value: String,
}

/// Numeric metrics tracked by the spike analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    TcpConnections,
}

/// z-score cut points used to grade a metric spike
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityCuts {
    /// HIGH when confidence also reaches the high-confidence floor
    pub critical: f64,
    /// HIGH when confidence is at least 0.8
    pub elevated: f64,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::TcpConnections,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::TcpConnections => "tcp_connections",
        }
    }

    /// Human label used in anomaly descriptions
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "CPU usage",
            MetricKind::Memory => "Memory usage",
            MetricKind::Disk => "Disk usage",
            MetricKind::TcpConnections => "TCP connection",
        }
    }

    pub fn anomaly_type(&self) -> AnomalyType {
        match self {
            MetricKind::Cpu => AnomalyType::CpuSpike,
            MetricKind::Memory => AnomalyType::MemorySpike,
            MetricKind::Disk => AnomalyType::DiskSpike,
            MetricKind::TcpConnections => AnomalyType::ConnectionSpike,
        }
    }

    pub fn affected_resource(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "system_cpu",
            MetricKind::Memory => "system_memory",
            MetricKind::Disk => "system_disk",
            MetricKind::TcpConnections => "network_connections",
        }
    }

    /// Per-metric severity cut points; cpu and memory are graded tighter
    pub fn severity_cuts(&self) -> SeverityCuts {
        match self {
            MetricKind::Cpu | MetricKind::Memory => SeverityCuts {
                critical: 3.0,
                elevated: 2.5,
            },
            MetricKind::Disk | MetricKind::TcpConnections => SeverityCuts {
                critical: 4.0,
                elevated: 3.5,
            },
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKind::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseKindError {
                kind: "metric",
                value: s.to_string(),
            })
    }
}

/// Anomaly severity
///
/// Declaration order gives `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

    /// Sort rank: HIGH=3, MEDIUM=2, LOW=1
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseKindError {
                kind: "severity",
                value: s.to_string(),
            })
    }
}

/// Anomaly type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    CpuSpike,
    MemorySpike,
    DiskSpike,
    ConnectionSpike,
    IpRequestSpike,
    HighErrorRate,
    ContainerRestartLoop,
    HighEventVolume,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 8] = [
        AnomalyType::CpuSpike,
        AnomalyType::MemorySpike,
        AnomalyType::DiskSpike,
        AnomalyType::ConnectionSpike,
        AnomalyType::IpRequestSpike,
        AnomalyType::HighErrorRate,
        AnomalyType::ContainerRestartLoop,
        AnomalyType::HighEventVolume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::CpuSpike => "cpu_spike",
            AnomalyType::MemorySpike => "memory_spike",
            AnomalyType::DiskSpike => "disk_spike",
            AnomalyType::ConnectionSpike => "connection_spike",
            AnomalyType::IpRequestSpike => "ip_request_spike",
            AnomalyType::HighErrorRate => "high_error_rate",
            AnomalyType::ContainerRestartLoop => "container_restart_loop",
            AnomalyType::HighEventVolume => "high_event_volume",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnomalyType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ParseKindError {
                kind: "anomaly type",
                value: s.to_string(),
            })
    }
}

/// Which rule flagged a metric spike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Zscore,
    Percentage,
    Absolute,
}

/// Evidence from one comparison window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowCorroboration {
    pub window_hours: u32,
    pub zscore: f64,
    pub sample_count: usize,
    pub anomaly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSpikeDetails {
    pub metric: MetricKind,
    pub detection_method: DetectionMethod,
    pub baseline: BaselineStatistics,
    pub recent_mean: f64,
    pub zscore: f64,
    /// `None` when the baseline mean is not positive
    pub percent_change: Option<f64>,
    pub absolute_change: f64,
    pub baseline_samples: usize,
    pub recent_samples: usize,
    pub trend: TrendAnalysis,
    /// Comparison windows that are anomalous on their own
    pub agreeing_windows: usize,
    pub windows: Vec<WindowCorroboration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpBurstDetails {
    pub ip_address: String,
    pub count: usize,
    pub requests_per_hour: f64,
    pub time_span_hours: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRateDetails {
    pub container: String,
    pub error_rate: f64,
    pub total_logs: usize,
    pub error_logs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestartLoopDetails {
    pub container: String,
    pub restart_count: usize,
    pub time_span_seconds: i64,
    /// Human-readable form of `time_span_seconds`
    pub time_span: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCount {
    pub action: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventVolumeDetails {
    pub total_events: usize,
    pub top_actions: Vec<ActionCount>,
}

/// Method-specific evidence attached to an anomaly
///
/// Serialized without a tag: the anomaly's `type` already identifies the
/// variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnomalyDetails {
    MetricSpike(MetricSpikeDetails),
    IpBurst(IpBurstDetails),
    ErrorRate(ErrorRateDetails),
    RestartLoop(RestartLoopDetails),
    EventVolume(EventVolumeDetails),
}

/// A detected anomaly
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub details: AnomalyDetails,
    pub affected_resource: Option<String>,
    /// Confidence score in [0, 1]
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_rank() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::High.rank(), 3);
        assert_eq!(Severity::Low.rank(), 1);
    }

    #[test]
    fn test_severity_parse_case_insensitive() {
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" Medium ".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_anomaly_type_round_trip_names() {
        for t in AnomalyType::ALL {
            assert_eq!(t.as_str().parse::<AnomalyType>().unwrap(), t);
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, t.as_str());
        }
    }

    #[test]
    fn test_metric_kind_mapping() {
        assert_eq!(MetricKind::Cpu.anomaly_type(), AnomalyType::CpuSpike);
        assert_eq!(
            MetricKind::TcpConnections.affected_resource(),
            "network_connections"
        );
        assert_eq!(
            "tcp_connections".parse::<MetricKind>().unwrap(),
            MetricKind::TcpConnections
        );
        assert!(MetricKind::Cpu.severity_cuts().critical < MetricKind::Disk.severity_cuts().critical);
    }

    #[test]
    fn test_anomaly_serializes_type_and_flat_details() {
        let ts = "2024-05-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let anomaly = Anomaly {
            anomaly_type: AnomalyType::HighErrorRate,
            severity: Severity::High,
            timestamp: ts,
            description: "High error rate in container web-1: 33.3%".to_string(),
            details: AnomalyDetails::ErrorRate(ErrorRateDetails {
                container: "web-1".to_string(),
                error_rate: 33.33,
                total_logs: 12,
                error_logs: 4,
            }),
            affected_resource: Some("web-1".to_string()),
            confidence: 1.0,
        };

        let json = serde_json::to_value(&anomaly).unwrap();
        assert_eq!(json["type"], "high_error_rate");
        assert_eq!(json["severity"], "HIGH");
        assert_eq!(json["details"]["container"], "web-1");
        assert_eq!(json["details"]["error_logs"], 4);
        assert_eq!(json["affected_resource"], "web-1");
    }
}
