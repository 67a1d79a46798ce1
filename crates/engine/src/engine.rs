//! Detection orchestrator
//!
//! Fans out to the metric spike analyzer (one query pair per tracked metric)
//! and the log and event detectors, waits for all of them, and merges their
//! anomalies. A failing detector is logged and reported but never aborts the
//! others.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::anomaly::{
    BaselineBuilder, ErrorRateDetector, IpBurstDetector, LifecycleDetector, MetricSpikeAnalyzer,
    SpikeVerdict,
};
use crate::clock::{Clock, SystemClock};
use crate::error::DetectionError;
use crate::models::{Anomaly, LifecycleEvent, LogEntry, MetricKind};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::store::{bounded, TelemetryStore};
use crate::summary::AnomalySummary;
use crate::thresholds::AnomalyThresholds;

/// Default deadline for a single store query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// The independent detectors run by a detection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    MetricSpike,
    IpBurst,
    ErrorRate,
    Event,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 4] = [
        DetectorKind::MetricSpike,
        DetectorKind::IpBurst,
        DetectorKind::ErrorRate,
        DetectorKind::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::MetricSpike => "metric_spike",
            DetectorKind::IpBurst => "ip_burst",
            DetectorKind::ErrorRate => "error_rate",
            DetectorKind::Event => "event",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detector (or one metric of the spike analyzer) that failed during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorFailure {
    pub detector: DetectorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricKind>,
    pub error: String,
}

/// Anomalies from a detection pass plus the detectors that failed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionReport {
    pub anomalies: Vec<Anomaly>,
    pub failures: Vec<DetectorFailure>,
}

impl DetectionReport {
    pub fn merge(&mut self, other: DetectionReport) {
        self.anomalies.extend(other.anomalies);
        self.failures.extend(other.failures);
    }

    /// True when at least one detector failed
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed(&self, detector: DetectorKind) -> bool {
        self.failures.iter().any(|f| f.detector == detector)
    }
}

/// Order anomalies by severity (HIGH first), then newest first
///
/// Ties are broken by type and affected resource so the order is stable
/// across runs.
pub fn sort_anomalies(anomalies: &mut [Anomaly]) {
    anomalies.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.anomaly_type.cmp(&b.anomaly_type))
            .then_with(|| a.affected_resource.cmp(&b.affected_resource))
    });
}

/// Statistical anomaly detection engine
///
/// Built once at startup and shared behind an `Arc`. Holds an immutable
/// threshold snapshot; every detection pass is stateless.
pub struct AnomalyEngine {
    store: Arc<dyn TelemetryStore>,
    thresholds: Arc<AnomalyThresholds>,
    clock: Arc<dyn Clock>,
    query_timeout: Duration,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl AnomalyEngine {
    pub fn new(store: Arc<dyn TelemetryStore>, thresholds: AnomalyThresholds) -> Self {
        Self {
            store,
            thresholds: Arc::new(thresholds),
            clock: Arc::new(SystemClock),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("anomaly-engine"),
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the deadline applied to every store query
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run every detector over the last `lookback_hours` and return the
    /// merged, sorted anomalies
    pub async fn detect_all(&self, lookback_hours: u32) -> Vec<Anomaly> {
        self.detect_all_with_report(lookback_hours).await.anomalies
    }

    /// Like [`detect_all`](Self::detect_all), also reporting failed detectors
    pub async fn detect_all_with_report(&self, lookback_hours: u32) -> DetectionReport {
        let started = Instant::now();
        let now = self.clock.now();

        let (metric_spikes, ip_bursts, error_rates, events) = tokio::join!(
            self.metric_spikes_at(now, lookback_hours),
            self.ip_anomalies_at(now, lookback_hours),
            self.error_rate_anomalies_at(now, lookback_hours),
            self.event_anomalies_at(now, lookback_hours),
        );

        let mut report = DetectionReport::default();
        report.merge(metric_spikes);
        report.merge(ip_bursts);
        report.merge(error_rates);
        report.merge(events);
        sort_anomalies(&mut report.anomalies);

        for anomaly in &report.anomalies {
            self.metrics.inc_anomaly(anomaly);
            self.logger.log_anomaly(anomaly);
        }

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.observe_detection_latency(elapsed);
        self.logger.log_detection_run(
            lookback_hours,
            report.anomalies.len(),
            report.failures.len(),
            elapsed,
        );

        report
    }

    /// Metric spikes only
    pub async fn detect_metric_spikes(&self, lookback_hours: u32) -> DetectionReport {
        let mut report = self.metric_spikes_at(self.clock.now(), lookback_hours).await;
        sort_anomalies(&mut report.anomalies);
        report
    }

    /// IP request bursts only
    pub async fn detect_ip_anomalies(&self, lookback_hours: u32) -> DetectionReport {
        let mut report = self.ip_anomalies_at(self.clock.now(), lookback_hours).await;
        sort_anomalies(&mut report.anomalies);
        report
    }

    /// Per-resource error rates only
    pub async fn detect_error_rate_anomalies(&self, lookback_hours: u32) -> DetectionReport {
        let mut report = self
            .error_rate_anomalies_at(self.clock.now(), lookback_hours)
            .await;
        sort_anomalies(&mut report.anomalies);
        report
    }

    /// Restart loops and event volume only
    pub async fn detect_event_anomalies(&self, lookback_hours: u32) -> DetectionReport {
        let mut report = self.event_anomalies_at(self.clock.now(), lookback_hours).await;
        sort_anomalies(&mut report.anomalies);
        report
    }

    /// Detect over the last `hours` and summarize the result
    pub async fn summary(&self, hours: u32) -> AnomalySummary {
        let anomalies = self.detect_all(hours).await;
        AnomalySummary::from_anomalies(&anomalies, self.clock.now())
    }

    async fn metric_spikes_at(&self, now: DateTime<Utc>, lookback_hours: u32) -> DetectionReport {
        if lookback_hours >= self.thresholds.baseline_hours {
            warn!(
                lookback_hours,
                baseline_hours = self.thresholds.baseline_hours,
                "Lookback covers the whole baseline window; metric spikes cannot be detected"
            );
        }

        let [cpu, memory, disk, tcp] = MetricKind::ALL;
        let (cpu_result, memory_result, disk_result, tcp_result) = tokio::join!(
            self.metric_spike(cpu, now, lookback_hours),
            self.metric_spike(memory, now, lookback_hours),
            self.metric_spike(disk, now, lookback_hours),
            self.metric_spike(tcp, now, lookback_hours),
        );

        let mut report = DetectionReport::default();
        for (metric, result) in [
            (cpu, cpu_result),
            (memory, memory_result),
            (disk, disk_result),
            (tcp, tcp_result),
        ] {
            match result {
                Ok(anomaly) => report.anomalies.extend(anomaly),
                Err(e) => report
                    .failures
                    .push(self.failure(DetectorKind::MetricSpike, Some(metric), e)),
            }
        }
        report
    }

    async fn metric_spike(
        &self,
        metric: MetricKind,
        now: DateTime<Utc>,
        lookback_hours: u32,
    ) -> Result<Option<Anomaly>, DetectionError> {
        let windows = BaselineBuilder::new(self.store.as_ref(), self.query_timeout)
            .build(metric, now, lookback_hours, self.thresholds.baseline_hours)
            .await?;

        let verdict = MetricSpikeAnalyzer::new(&self.thresholds).evaluate(&windows, now);
        if verdict == SpikeVerdict::InsufficientData {
            self.metrics.inc_metric_skipped(metric);
        }

        Ok(verdict.into_anomaly())
    }

    async fn ip_anomalies_at(&self, now: DateTime<Utc>, lookback_hours: u32) -> DetectionReport {
        match self.logs(now, lookback_hours).await {
            Ok(logs) => DetectionReport {
                anomalies: IpBurstDetector::new(&self.thresholds).detect(&logs),
                failures: Vec::new(),
            },
            Err(e) => self.failed_report(DetectorKind::IpBurst, e),
        }
    }

    async fn error_rate_anomalies_at(
        &self,
        now: DateTime<Utc>,
        lookback_hours: u32,
    ) -> DetectionReport {
        match self.logs(now, lookback_hours).await {
            Ok(logs) => DetectionReport {
                anomalies: ErrorRateDetector::new(&self.thresholds).detect(&logs, now),
                failures: Vec::new(),
            },
            Err(e) => self.failed_report(DetectorKind::ErrorRate, e),
        }
    }

    async fn event_anomalies_at(&self, now: DateTime<Utc>, lookback_hours: u32) -> DetectionReport {
        match self.events(now, lookback_hours).await {
            Ok(events) => DetectionReport {
                anomalies: LifecycleDetector::new(&self.thresholds).detect(&events, now),
                failures: Vec::new(),
            },
            Err(e) => self.failed_report(DetectorKind::Event, e),
        }
    }

    async fn logs(
        &self,
        now: DateTime<Utc>,
        lookback_hours: u32,
    ) -> Result<Vec<LogEntry>, DetectionError> {
        let start = now - chrono::Duration::hours(i64::from(lookback_hours));
        bounded(self.query_timeout, self.store.fetch_logs(start, now)).await
    }

    async fn events(
        &self,
        now: DateTime<Utc>,
        lookback_hours: u32,
    ) -> Result<Vec<LifecycleEvent>, DetectionError> {
        let start = now - chrono::Duration::hours(i64::from(lookback_hours));
        bounded(self.query_timeout, self.store.fetch_events(start, now)).await
    }

    fn failed_report(&self, detector: DetectorKind, error: DetectionError) -> DetectionReport {
        DetectionReport {
            anomalies: Vec::new(),
            failures: vec![self.failure(detector, None, error)],
        }
    }

    fn failure(
        &self,
        detector: DetectorKind,
        metric: Option<MetricKind>,
        error: DetectionError,
    ) -> DetectorFailure {
        let error = error.to_string();
        self.metrics.inc_detector_failure(detector.as_str());
        self.logger
            .log_detector_failure(detector.as_str(), metric, &error);

        DetectorFailure {
            detector,
            metric,
            error,
        }
    }
}
