//! Per-resource error-rate spikes in log streams

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::RULE_CONFIDENCE;
use crate::models::{Anomaly, AnomalyDetails, AnomalyType, ErrorRateDetails, LogEntry, Severity};
use crate::thresholds::AnomalyThresholds;

/// Substrings that mark a log line as an error (matched case-insensitively)
pub const ERROR_KEYWORDS: [&str; 8] = [
    "error",
    "exception",
    "failed",
    "fatal",
    "critical",
    "500",
    "404",
    "timeout",
];

/// Resources with fewer log lines are not rated
pub const MIN_LOGS_FOR_ERROR_RATE: usize = 10;

/// Error rate (percent) above which an anomaly is graded HIGH
pub const HIGH_ERROR_RATE: f64 = 25.0;

/// Resource name used for log lines without one
pub const UNKNOWN_RESOURCE: &str = "unknown";

pub fn is_error_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ERROR_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[derive(Default)]
struct LogCounts {
    total: usize,
    errors: usize,
}

/// Flags resources whose share of error lines exceeds the threshold
pub struct ErrorRateDetector<'a> {
    thresholds: &'a AnomalyThresholds,
}

impl<'a> ErrorRateDetector<'a> {
    pub fn new(thresholds: &'a AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Rate every resource in `logs`; anomalies are stamped with `now`
    pub fn detect(&self, logs: &[LogEntry], now: DateTime<Utc>) -> Vec<Anomaly> {
        let mut by_resource: BTreeMap<&str, LogCounts> = BTreeMap::new();

        for log in logs {
            let resource = if log.resource.is_empty() {
                UNKNOWN_RESOURCE
            } else {
                log.resource.as_str()
            };

            let counts = by_resource.entry(resource).or_default();
            counts.total += 1;
            if is_error_message(&log.message) {
                counts.errors += 1;
            }
        }

        by_resource
            .into_iter()
            .filter(|(_, c)| c.total >= MIN_LOGS_FOR_ERROR_RATE)
            .filter_map(|(resource, c)| {
                let error_rate = c.errors as f64 / c.total as f64 * 100.0;
                (error_rate > self.thresholds.error_rate_threshold)
                    .then(|| error_rate_anomaly(resource, &c, error_rate, now))
            })
            .collect()
    }
}

fn error_rate_anomaly(
    resource: &str,
    counts: &LogCounts,
    error_rate: f64,
    now: DateTime<Utc>,
) -> Anomaly {
    let severity = if error_rate > HIGH_ERROR_RATE {
        Severity::High
    } else {
        Severity::Medium
    };

    Anomaly {
        anomaly_type: AnomalyType::HighErrorRate,
        severity,
        timestamp: now,
        description: format!(
            "High error rate in container {}: {:.1}%",
            resource, error_rate
        ),
        details: AnomalyDetails::ErrorRate(ErrorRateDetails {
            container: resource.to_string(),
            error_rate,
            total_logs: counts.total,
            error_logs: counts.errors,
        }),
        affected_resource: Some(resource.to_string()),
        confidence: RULE_CONFIDENCE,
    }
}
