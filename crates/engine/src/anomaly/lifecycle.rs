//! Lifecycle event anomalies: restart loops and event storms

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use super::RULE_CONFIDENCE;
use crate::models::{
    ActionCount, Anomaly, AnomalyDetails, AnomalyType, EventVolumeDetails, LifecycleEvent,
    RestartLoopDetails, Severity,
};
use crate::thresholds::AnomalyThresholds;

/// Number of actions kept in the event-volume histogram
pub const TOP_ACTIONS: usize = 5;

/// Affected resource reported for event storms
pub const EVENT_VOLUME_RESOURCE: &str = "lifecycle_events";

pub fn is_restart(action: &str) -> bool {
    action.to_lowercase().contains("restart")
}

/// Render a span as `H:MM:SS`, prefixed with whole days when longer than one
pub fn format_span(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    match days {
        0 => format!("{}:{:02}:{:02}", hours, minutes, secs),
        1 => format!("1 day, {}:{:02}:{:02}", hours, minutes, secs),
        d => format!("{} days, {}:{:02}:{:02}", d, hours, minutes, secs),
    }
}

/// Detects restart loops per resource and fleet-wide event storms
pub struct LifecycleDetector<'a> {
    thresholds: &'a AnomalyThresholds,
}

impl<'a> LifecycleDetector<'a> {
    pub fn new(thresholds: &'a AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Run both checks; restart loops come first, ordered by resource
    pub fn detect(&self, events: &[LifecycleEvent], now: DateTime<Utc>) -> Vec<Anomaly> {
        let mut anomalies = self.restart_loops(events);
        anomalies.extend(self.event_volume(events, now));
        anomalies
    }

    /// Resources restarted more often than the configured threshold
    ///
    /// Events without a resource are not attributed to any loop.
    pub fn restart_loops(&self, events: &[LifecycleEvent]) -> Vec<Anomaly> {
        let mut restarts: BTreeMap<&str, Vec<DateTime<Utc>>> = BTreeMap::new();

        for event in events {
            if !event.resource.is_empty() && is_restart(&event.action) {
                restarts
                    .entry(event.resource.as_str())
                    .or_default()
                    .push(event.timestamp);
            }
        }

        restarts
            .into_iter()
            .filter(|(_, ts)| ts.len() > self.thresholds.container_restart_threshold)
            .filter_map(|(resource, ts)| {
                let first = *ts.iter().min()?;
                let last = *ts.iter().max()?;
                let span_seconds = (last - first).num_seconds();

                Some(Anomaly {
                    anomaly_type: AnomalyType::ContainerRestartLoop,
                    severity: Severity::High,
                    timestamp: last,
                    description: format!("Container {} restarted {} times", resource, ts.len()),
                    details: AnomalyDetails::RestartLoop(RestartLoopDetails {
                        container: resource.to_string(),
                        restart_count: ts.len(),
                        time_span_seconds: span_seconds,
                        time_span: format_span(span_seconds),
                    }),
                    affected_resource: Some(resource.to_string()),
                    confidence: RULE_CONFIDENCE,
                })
            })
            .collect()
    }

    /// One anomaly when the window holds more events than the threshold
    pub fn event_volume(&self, events: &[LifecycleEvent], now: DateTime<Utc>) -> Option<Anomaly> {
        let total = events.len();
        if total <= self.thresholds.event_volume_threshold {
            return None;
        }

        Some(Anomaly {
            anomaly_type: AnomalyType::HighEventVolume,
            severity: Severity::Medium,
            timestamp: now,
            description: format!("High lifecycle event volume: {} events", total),
            details: AnomalyDetails::EventVolume(EventVolumeDetails {
                total_events: total,
                top_actions: top_actions(events, TOP_ACTIONS),
            }),
            affected_resource: Some(EVENT_VOLUME_RESOURCE.to_string()),
            confidence: RULE_CONFIDENCE,
        })
    }
}

/// Most frequent actions, by count descending then action name
pub fn top_actions(events: &[LifecycleEvent], limit: usize) -> Vec<ActionCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for event in events {
        let action = if event.action.is_empty() {
            "unknown"
        } else {
            event.action.as_str()
        };
        *counts.entry(action).or_default() += 1;
    }

    let mut ranked: Vec<ActionCount> = counts
        .into_iter()
        .map(|(action, count)| ActionCount {
            action: action.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.action.cmp(&b.action)));
    ranked.truncate(limit);
    ranked
}
