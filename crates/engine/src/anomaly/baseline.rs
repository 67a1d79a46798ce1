//! Baseline and recent window retrieval
//!
//! For a metric, fetches two disjoint contiguous windows:
//! `baseline = [now - baseline_hours, now - lookback_hours)` and
//! `recent = [now - lookback_hours, now)`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::DetectionError;
use crate::models::{MetricKind, MetricSample};
use crate::store::{bounded, TelemetryStore};
use crate::thresholds::AnomalyThresholds;

/// Baseline and recent samples of one metric
#[derive(Debug, Clone)]
pub struct MetricWindows {
    pub metric: MetricKind,
    pub baseline: Vec<MetricSample>,
    pub recent: Vec<MetricSample>,
    /// Samples discarded because their value was not finite
    pub dropped: usize,
}

impl MetricWindows {
    /// Build windows, discarding malformed (non-finite) samples
    pub fn new(metric: MetricKind, baseline: Vec<MetricSample>, recent: Vec<MetricSample>) -> Self {
        let total = baseline.len() + recent.len();
        let baseline: Vec<MetricSample> =
            baseline.into_iter().filter(|s| s.value.is_finite()).collect();
        let recent: Vec<MetricSample> = recent.into_iter().filter(|s| s.value.is_finite()).collect();
        let dropped = total - baseline.len() - recent.len();

        Self {
            metric,
            baseline,
            recent,
            dropped,
        }
    }

    pub fn baseline_values(&self) -> Vec<f64> {
        self.baseline.iter().map(|s| s.value).collect()
    }

    pub fn recent_values(&self) -> Vec<f64> {
        self.recent.iter().map(|s| s.value).collect()
    }

    /// Values from both windows with `start <= timestamp < end`
    pub fn values_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<f64> {
        self.baseline
            .iter()
            .chain(self.recent.iter())
            .filter(|s| s.timestamp >= start && s.timestamp < end)
            .map(|s| s.value)
            .collect()
    }

    /// Check minimum sample counts for both windows
    pub fn is_sufficient(&self, thresholds: &AnomalyThresholds) -> bool {
        self.baseline.len() >= thresholds.min_baseline_samples
            && self.recent.len() >= thresholds.min_recent_samples
    }
}

/// Fetches baseline and recent windows from a telemetry store
pub struct BaselineBuilder<'a> {
    store: &'a dyn TelemetryStore,
    query_timeout: Duration,
}

impl<'a> BaselineBuilder<'a> {
    pub fn new(store: &'a dyn TelemetryStore, query_timeout: Duration) -> Self {
        Self {
            store,
            query_timeout,
        }
    }

    /// Fetch both windows concurrently
    ///
    /// An empty baseline (when `baseline_hours <= lookback_hours`) is not an
    /// error; the analyzer treats it as insufficient data.
    pub async fn build(
        &self,
        metric: MetricKind,
        now: DateTime<Utc>,
        lookback_hours: u32,
        baseline_hours: u32,
    ) -> Result<MetricWindows, DetectionError> {
        let recent_start = now - chrono::Duration::hours(i64::from(lookback_hours));
        let baseline_start = now - chrono::Duration::hours(i64::from(baseline_hours));

        let baseline_query = async {
            if baseline_start >= recent_start {
                debug!(
                    metric = %metric,
                    lookback_hours,
                    baseline_hours,
                    "Baseline window is empty"
                );
                return Ok(Vec::new());
            }
            bounded(
                self.query_timeout,
                self.store
                    .fetch_metric_series(metric, baseline_start, recent_start),
            )
            .await
        };
        let recent_query = bounded(
            self.query_timeout,
            self.store.fetch_metric_series(metric, recent_start, now),
        );

        let (baseline, recent) = tokio::join!(baseline_query, recent_query);
        let windows = MetricWindows::new(metric, baseline?, recent?);

        if windows.dropped > 0 {
            debug!(
                metric = %metric,
                dropped = windows.dropped,
                "Dropped malformed metric samples"
            );
        }

        Ok(windows)
    }
}
