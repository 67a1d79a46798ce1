//! Aggregation and filtering of detection results

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Anomaly, AnomalyType, Severity};

/// Number of anomalies listed in a summary
pub const RECENT_ANOMALY_LIMIT: usize = 10;

/// Compact form of an anomaly for summaries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyDigest {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub affected_resource: Option<String>,
}

impl From<&Anomaly> for AnomalyDigest {
    fn from(anomaly: &Anomaly) -> Self {
        Self {
            anomaly_type: anomaly.anomaly_type,
            severity: anomaly.severity,
            timestamp: anomaly.timestamp,
            description: anomaly.description.clone(),
            affected_resource: anomaly.affected_resource.clone(),
        }
    }
}

/// Counts of a detection pass by type, severity and resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalySummary {
    pub total_anomalies: usize,
    pub by_type: BTreeMap<AnomalyType, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Sorted, without duplicates
    pub affected_resources: Vec<String>,
    /// The first anomalies in detection order (most severe first)
    pub recent_anomalies: Vec<AnomalyDigest>,
    pub generated_at: DateTime<Utc>,
}

impl AnomalySummary {
    /// Summarize anomalies already sorted by the engine
    pub fn from_anomalies(anomalies: &[Anomaly], generated_at: DateTime<Utc>) -> Self {
        let mut by_type = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        let mut resources = BTreeSet::new();

        for anomaly in anomalies {
            *by_type.entry(anomaly.anomaly_type).or_insert(0) += 1;
            *by_severity.entry(anomaly.severity).or_insert(0) += 1;
            if let Some(resource) = &anomaly.affected_resource {
                resources.insert(resource.clone());
            }
        }

        Self {
            total_anomalies: anomalies.len(),
            by_type,
            by_severity,
            affected_resources: resources.into_iter().collect(),
            recent_anomalies: anomalies
                .iter()
                .take(RECENT_ANOMALY_LIMIT)
                .map(AnomalyDigest::from)
                .collect(),
            generated_at,
        }
    }
}

/// Post-detection filter on severity and type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyFilter {
    pub severity: Option<Severity>,
    pub anomaly_type: Option<AnomalyType>,
}

impl AnomalyFilter {
    pub fn matches(&self, anomaly: &Anomaly) -> bool {
        self.severity.map_or(true, |s| anomaly.severity == s)
            && self.anomaly_type.map_or(true, |t| anomaly.anomaly_type == t)
    }

    /// Keep matching anomalies, preserving order
    pub fn apply(&self, anomalies: Vec<Anomaly>) -> Vec<Anomaly> {
        anomalies.into_iter().filter(|a| self.matches(a)).collect()
    }
}
