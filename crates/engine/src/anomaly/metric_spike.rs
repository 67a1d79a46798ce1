//! Metric spike analysis
//!
//! Compares the recent window of a metric against its baseline. Detection
//! rules are evaluated in order and the first match wins:
//! 1. z-score of the recent mean at or above the metric's z threshold
//! 2. percentage increase over a positive baseline mean above the metric's
//!    percentage threshold
//! 3. absolute increase above the connection threshold (tcp connections only)

use chrono::{DateTime, Utc};
use tracing::debug;

use super::baseline::MetricWindows;
use super::corroboration::Corroborator;
use crate::models::{
    Anomaly, AnomalyDetails, DetectionMethod, MetricKind, MetricSpikeDetails, Severity,
};
use crate::stats::{self, TrendAnalysis, TrendDirection};
use crate::thresholds::AnomalyThresholds;

/// Baseline size at which sample-size confidence saturates
const FULL_BASELINE_SAMPLES: f64 = 50.0;

/// Recent window size at which sample-size confidence saturates
const FULL_RECENT_SAMPLES: f64 = 10.0;

/// Confidence needed for HIGH at the elevated z cut
const ELEVATED_CONFIDENCE: f64 = 0.8;

const MEDIUM_ZSCORE: f64 = 2.0;
const MEDIUM_CONFIDENCE: f64 = 0.7;

/// Outcome of analyzing one metric
#[derive(Debug, Clone, PartialEq)]
pub enum SpikeVerdict {
    /// Not enough baseline or recent samples
    InsufficientData,
    /// No detection rule matched
    Normal,
    /// A rule matched but confidence was under the configured floor
    LowConfidence(f64),
    Anomaly(Box<Anomaly>),
}

impl SpikeVerdict {
    pub fn into_anomaly(self) -> Option<Anomaly> {
        match self {
            SpikeVerdict::Anomaly(anomaly) => Some(*anomaly),
            _ => None,
        }
    }
}

/// Analyzes one metric's windows against the configured thresholds
pub struct MetricSpikeAnalyzer<'a> {
    thresholds: &'a AnomalyThresholds,
}

impl<'a> MetricSpikeAnalyzer<'a> {
    pub fn new(thresholds: &'a AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Analyze a metric and return the anomaly, if any
    pub fn analyze(&self, windows: &MetricWindows, now: DateTime<Utc>) -> Option<Anomaly> {
        self.evaluate(windows, now).into_anomaly()
    }

    /// Analyze a metric and report why no anomaly was produced
    pub fn evaluate(&self, windows: &MetricWindows, now: DateTime<Utc>) -> SpikeVerdict {
        let metric = windows.metric;

        if !windows.is_sufficient(self.thresholds) {
            debug!(
                metric = %metric,
                baseline_samples = windows.baseline.len(),
                recent_samples = windows.recent.len(),
                "Insufficient data for spike analysis"
            );
            return SpikeVerdict::InsufficientData;
        }

        let baseline_values = windows.baseline_values();
        let recent_values = windows.recent_values();

        let baseline = stats::stats(&baseline_values);
        let recent_mean = stats::mean(&recent_values);
        let z = stats::zscore(recent_mean, &baseline);
        let absolute_change = recent_mean - baseline.mean;
        let percent_change =
            (baseline.mean > 0.0).then(|| absolute_change / baseline.mean * 100.0);

        let Some(method) = self.detection_method(metric, z, percent_change, absolute_change) else {
            return SpikeVerdict::Normal;
        };

        let trend = stats::trend(&recent_values, self.thresholds.trend_window);
        let confidence =
            spike_confidence(z, baseline_values.len(), recent_values.len(), &trend);

        if confidence < self.thresholds.min_confidence {
            debug!(
                metric = %metric,
                zscore = z,
                confidence,
                min_confidence = self.thresholds.min_confidence,
                "Spike below confidence floor"
            );
            return SpikeVerdict::LowConfidence(confidence);
        }

        let severity = grade_severity(metric, z, confidence, self.thresholds.high_confidence);
        let windows_evidence = Corroborator::new(&self.thresholds.comparison_windows)
            .corroborate(&baseline, windows, now);

        let description = match method {
            DetectionMethod::Zscore => format!(
                "{} spike detected: recent mean {:.1} vs baseline {:.1} (z-score {:.2})",
                metric.label(),
                recent_mean,
                baseline.mean,
                z
            ),
            DetectionMethod::Percentage => format!(
                "{} spike detected: {:.1}% increase over baseline",
                metric.label(),
                percent_change.unwrap_or_default()
            ),
            DetectionMethod::Absolute => format!(
                "{} spike detected: {:.0} new connections",
                metric.label(),
                absolute_change
            ),
        };

        let timestamp = windows.recent.last().map_or(now, |s| s.timestamp);

        SpikeVerdict::Anomaly(Box::new(Anomaly {
            anomaly_type: metric.anomaly_type(),
            severity,
            timestamp,
            description,
            details: AnomalyDetails::MetricSpike(MetricSpikeDetails {
                metric,
                detection_method: method,
                baseline,
                recent_mean,
                zscore: z,
                percent_change,
                absolute_change,
                baseline_samples: baseline_values.len(),
                recent_samples: recent_values.len(),
                trend,
                agreeing_windows: Corroborator::agreeing(&windows_evidence),
                windows: windows_evidence,
            }),
            affected_resource: Some(metric.affected_resource().to_string()),
            confidence,
        }))
    }

    fn detection_method(
        &self,
        metric: MetricKind,
        z: f64,
        percent_change: Option<f64>,
        absolute_change: f64,
    ) -> Option<DetectionMethod> {
        if z >= self.thresholds.zscore_for(metric) {
            return Some(DetectionMethod::Zscore);
        }

        if percent_change.is_some_and(|pct| pct > self.thresholds.percent_for(metric)) {
            return Some(DetectionMethod::Percentage);
        }

        match self.thresholds.absolute_for(metric) {
            Some(limit) if absolute_change > limit => Some(DetectionMethod::Absolute),
            _ => None,
        }
    }
}

/// Confidence of a metric spike in [0, 1]
///
/// `sigmoid(z - 2) * sample_size * trend_weight`, where `sample_size` averages
/// how close each window is to a full sample.
pub fn spike_confidence(
    z: f64,
    baseline_samples: usize,
    recent_samples: usize,
    trend: &TrendAnalysis,
) -> f64 {
    let baseline_fill = (baseline_samples as f64 / FULL_BASELINE_SAMPLES).min(1.0);
    let recent_fill = (recent_samples as f64 / FULL_RECENT_SAMPLES).min(1.0);
    let sample_size = (baseline_fill + recent_fill) / 2.0;

    let confidence = stats::sigmoid(z - 2.0) * sample_size * trend_weight(trend);
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Weight of the recent window's trend
///
/// A flat recent window is fully consistent with a step change. A drifting
/// window counts by how well the line fits, never below one half.
fn trend_weight(trend: &TrendAnalysis) -> f64 {
    match trend.direction {
        TrendDirection::Stable | TrendDirection::InsufficientData => 1.0,
        TrendDirection::Increasing | TrendDirection::Decreasing => {
            0.5 + 0.5 * trend.consistency.clamp(0.0, 1.0)
        }
        TrendDirection::Error => 0.5,
    }
}

/// Grade a metric spike from its z-score and confidence
pub fn grade_severity(metric: MetricKind, z: f64, confidence: f64, high_confidence: f64) -> Severity {
    let cuts = metric.severity_cuts();

    if (z >= cuts.critical && confidence >= high_confidence)
        || (z >= cuts.elevated && confidence >= ELEVATED_CONFIDENCE)
    {
        Severity::High
    } else if z >= MEDIUM_ZSCORE && confidence >= MEDIUM_CONFIDENCE {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricSample;

    fn now() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    /// Alternating baseline over hours 2..=24 (one sample every 10 minutes)
    /// and a constant recent hour (one sample every 5 minutes)
    fn windows(metric: MetricKind, low: f64, high: f64, recent: f64) -> MetricWindows {
        let baseline = (7..=144)
            .map(|i| {
                let v = if i % 2 == 0 { low } else { high };
                MetricSample::new(now() - chrono::Duration::minutes(i * 10), v)
            })
            .collect();
        let recent = (1..=12)
            .map(|i| MetricSample::new(now() - chrono::Duration::minutes(i * 5), recent))
            .rev()
            .collect();
        MetricWindows::new(metric, baseline, recent)
    }

    fn details(anomaly: &Anomaly) -> &MetricSpikeDetails {
        match &anomaly.details {
            AnomalyDetails::MetricSpike(d) => d,
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[test]
    fn test_zscore_spike_is_high() {
        let thresholds = AnomalyThresholds::default();
        let anomaly = MetricSpikeAnalyzer::new(&thresholds)
            .analyze(&windows(MetricKind::Cpu, 35.0, 45.0, 70.0), now())
            .unwrap();

        let d = details(&anomaly);
        assert_eq!(anomaly.anomaly_type.as_str(), "cpu_spike");
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(d.detection_method, DetectionMethod::Zscore);
        assert!((d.baseline.mean - 40.0).abs() < 1e-9);
        assert!(d.zscore > 5.5 && d.zscore < 6.5);
        assert!(anomaly.confidence > 0.9);
        assert_eq!(anomaly.affected_resource.as_deref(), Some("system_cpu"));
        assert_eq!(anomaly.timestamp, now() - chrono::Duration::minutes(5));
        assert_eq!(d.windows.len(), 3);
        assert!(d.windows[0].anomaly);
        assert_eq!(d.agreeing_windows, 3);
        assert!(anomaly.description.starts_with("CPU usage spike detected"));
    }

    #[test]
    fn test_trend_window_comes_from_thresholds() {
        let mut w = windows(MetricKind::Cpu, 35.0, 45.0, 70.0);
        for (i, sample) in w.recent.iter_mut().enumerate() {
            sample.value = 60.0 + i as f64 * 2.0;
        }

        let thresholds = AnomalyThresholds::default();
        let anomaly = MetricSpikeAnalyzer::new(&thresholds).analyze(&w, now()).unwrap();
        assert_eq!(details(&anomaly).trend.direction, TrendDirection::Increasing);

        let wide = AnomalyThresholds {
            trend_window: 50,
            ..AnomalyThresholds::default()
        };
        let anomaly = MetricSpikeAnalyzer::new(&wide).analyze(&w, now()).unwrap();
        assert_eq!(
            details(&anomaly).trend.direction,
            TrendDirection::InsufficientData
        );
    }

    #[test]
    fn test_insufficient_baseline_skips() {
        let thresholds = AnomalyThresholds::default();
        let mut w = windows(MetricKind::Memory, 35.0, 45.0, 90.0);
        w.baseline.truncate(thresholds.min_baseline_samples - 1);

        let verdict = MetricSpikeAnalyzer::new(&thresholds).evaluate(&w, now());
        assert_eq!(verdict, SpikeVerdict::InsufficientData);
    }

    #[test]
    fn test_normal_window_has_no_anomaly() {
        let thresholds = AnomalyThresholds::default();
        let verdict = MetricSpikeAnalyzer::new(&thresholds)
            .evaluate(&windows(MetricKind::Cpu, 35.0, 45.0, 41.0), now());
        assert_eq!(verdict, SpikeVerdict::Normal);
    }

    #[test]
    fn test_percentage_fallback_on_noisy_baseline() {
        let thresholds = AnomalyThresholds::default();
        let anomaly = MetricSpikeAnalyzer::new(&thresholds)
            .analyze(&windows(MetricKind::Cpu, 10.0, 90.0, 70.0), now())
            .unwrap();

        let d = details(&anomaly);
        assert_eq!(d.detection_method, DetectionMethod::Percentage);
        assert!((d.percent_change.unwrap() - 40.0).abs() < 1e-9);
        assert_eq!(anomaly.severity, Severity::Low);
        assert!(anomaly.description.contains("40.0% increase"));
    }

    #[test]
    fn test_absolute_fallback_only_for_connections() {
        let thresholds = AnomalyThresholds::default();
        let analyzer = MetricSpikeAnalyzer::new(&thresholds);

        let anomaly = analyzer
            .analyze(&windows(MetricKind::TcpConnections, 1000.0, 5000.0, 3600.0), now())
            .unwrap();
        assert_eq!(details(&anomaly).detection_method, DetectionMethod::Absolute);
        assert_eq!(anomaly.anomaly_type.as_str(), "connection_spike");
        assert_eq!(
            anomaly.affected_resource.as_deref(),
            Some("network_connections")
        );

        let verdict = analyzer.evaluate(&windows(MetricKind::Cpu, 1000.0, 5000.0, 3600.0), now());
        assert_eq!(verdict, SpikeVerdict::Normal);
    }

    #[test]
    fn test_confidence_floor_filters() {
        let thresholds = AnomalyThresholds {
            min_confidence: 0.5,
            ..AnomalyThresholds::default()
        };
        let verdict = MetricSpikeAnalyzer::new(&thresholds)
            .evaluate(&windows(MetricKind::Cpu, 10.0, 90.0, 70.0), now());
        assert!(matches!(verdict, SpikeVerdict::LowConfidence(c) if c < 0.5));
    }

    #[test]
    fn test_confidence_bounds() {
        let trends = [
            TrendAnalysis::insufficient_data(),
            TrendAnalysis::error(),
            stats::trend(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], 3),
        ];
        for trend in &trends {
            for z in [0.0, 0.5, 2.0, 6.0, 50.0, 1e6] {
                for (b, r) in [(0, 0), (1, 1), (20, 5), (500, 500)] {
                    let c = spike_confidence(z, b, r, trend);
                    assert!((0.0..=1.0).contains(&c), "confidence {c} out of range");
                }
            }
        }
        assert_eq!(spike_confidence(f64::NAN, 50, 10, &trends[0]), 0.0);
    }

    #[test]
    fn test_severity_monotonic_in_zscore() {
        let thresholds = AnomalyThresholds::default();
        let trend = TrendAnalysis::insufficient_data();

        for metric in MetricKind::ALL {
            for (b, r) in [(20, 5), (50, 10), (200, 60)] {
                let mut previous = Severity::Low;
                for step in 0..200 {
                    let z = step as f64 * 0.05;
                    let confidence = spike_confidence(z, b, r, &trend);
                    let severity =
                        grade_severity(metric, z, confidence, thresholds.high_confidence);
                    assert!(severity.rank() >= previous.rank());
                    previous = severity;
                }
            }
        }
    }

    #[test]
    fn test_drifting_window_lowers_confidence() {
        let flat = stats::trend(&[5.0; 10], 5);
        let drifting = stats::trend(&[1.0, 9.0, 2.0, 12.0, 3.0, 15.0, 4.0, 20.0, 5.0, 25.0], 3);
        assert!(drifting.is_trending());

        let c_flat = spike_confidence(4.0, 50, 10, &flat);
        let c_drift = spike_confidence(4.0, 50, 10, &drifting);
        assert!(c_drift < c_flat);
        assert!(c_drift >= c_flat * 0.5);
    }
}
