//! In-memory telemetry store
//!
//! Holds a snapshot of metrics, logs and events. Used by the server when it
//! is pointed at a JSON snapshot file, and by tests.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::{async_trait, TelemetryStore};
use crate::error::StoreError;
use crate::models::{LifecycleEvent, LogEntry, MetricKind, MetricSample};

/// A metric sample as persisted; the value may be missing or malformed
#[derive(Debug, Clone, Deserialize)]
pub struct RawSample {
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_value")]
    pub value: Option<f64>,
}

/// Numbers and numeric strings; anything else (null, "n/a", objects) is `None`
fn lenient_value<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|v| v.is_finite()))
}

/// Serialized telemetry snapshot
///
/// ```json
/// {
///   "metrics": { "cpu": [{ "timestamp": "2024-05-01T12:00:00Z", "value": 41.5 }] },
///   "logs": [{ "resource": "web-1", "message": "GET / 200", "timestamp": "..." }],
///   "events": [{ "resource": "db-1", "action": "restart", "timestamp": "..." }]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetrySnapshot {
    #[serde(default)]
    pub metrics: HashMap<MetricKind, Vec<RawSample>>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub events: Vec<LifecycleEvent>,
}

/// Telemetry held in memory, sorted by timestamp
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    metrics: HashMap<MetricKind, Vec<MetricSample>>,
    logs: Vec<LogEntry>,
    events: Vec<LifecycleEvent>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add samples for a metric
    pub fn with_metric_samples(
        mut self,
        metric: MetricKind,
        samples: impl IntoIterator<Item = MetricSample>,
    ) -> Self {
        let series = self.metrics.entry(metric).or_default();
        series.extend(samples);
        series.sort_by_key(|s| s.timestamp);
        self
    }

    /// Add log lines
    pub fn with_logs(mut self, logs: impl IntoIterator<Item = LogEntry>) -> Self {
        self.logs.extend(logs);
        self.logs.sort_by_key(|l| l.timestamp);
        self
    }

    /// Add lifecycle events
    pub fn with_events(mut self, events: impl IntoIterator<Item = LifecycleEvent>) -> Self {
        self.events.extend(events);
        self.events.sort_by_key(|e| e.timestamp);
        self
    }

    /// Build a store from a snapshot, dropping samples without a value
    pub fn from_snapshot(snapshot: TelemetrySnapshot) -> Self {
        let mut store = Self::new()
            .with_logs(snapshot.logs)
            .with_events(snapshot.events);

        for (metric, raw) in snapshot.metrics {
            let total = raw.len();
            let samples: Vec<MetricSample> = raw
                .into_iter()
                .filter_map(|s| s.value.map(|v| MetricSample::new(s.timestamp, v)))
                .collect();

            if samples.len() < total {
                debug!(
                    metric = %metric,
                    dropped = total - samples.len(),
                    "Dropped metric samples without a value"
                );
            }
            store = store.with_metric_samples(metric, samples);
        }

        store
    }

    /// Parse a JSON snapshot
    pub fn from_json_str(json: &str) -> Result<Self, StoreError> {
        let snapshot: TelemetrySnapshot =
            serde_json::from_str(json).map_err(|e| StoreError::InvalidData(e.to_string()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Load a JSON snapshot file
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn sample_count(&self, metric: MetricKind) -> usize {
        self.metrics.get(&metric).map_or(0, Vec::len)
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

fn in_range(ts: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    ts >= start && ts < end
}

#[async_trait]
impl TelemetryStore for InMemoryStore {
    async fn fetch_metric_series(
        &self,
        metric: MetricKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, StoreError> {
        Ok(self
            .metrics
            .get(&metric)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| in_range(s.timestamp, start, end))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self
            .logs
            .iter()
            .filter(|l| in_range(l.timestamp, start, end))
            .cloned()
            .collect())
    }

    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LifecycleEvent>, StoreError> {
        Ok(self
            .events
            .iter()
            .filter(|e| in_range(e.timestamp, start, end))
            .cloned()
            .collect())
    }
}
