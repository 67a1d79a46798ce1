//! Anomaly detectors
//!
//! This module provides:
//! - Baseline/recent window retrieval and statistical metric spike analysis
//! - Multi-window corroboration of metric spikes
//! - Rule-based detectors over logs (IP bursts, error rates) and lifecycle
//!   events (restart loops, event volume)

mod baseline;
mod corroboration;
mod error_rate;
mod ip_burst;
mod lifecycle;
mod metric_spike;

pub use baseline::{BaselineBuilder, MetricWindows};
pub use corroboration::{Corroborator, CORROBORATION_ZSCORE};
pub use error_rate::{
    is_error_message, ErrorRateDetector, ERROR_KEYWORDS, HIGH_ERROR_RATE, MIN_LOGS_FOR_ERROR_RATE,
    UNKNOWN_RESOURCE,
};
pub use ip_burst::{is_internal, public_addresses, IpBurstDetector, HIGH_BURST_COUNT};
pub use lifecycle::{
    format_span, is_restart, top_actions, LifecycleDetector, EVENT_VOLUME_RESOURCE, TOP_ACTIONS,
};
pub use metric_spike::{grade_severity, spike_confidence, MetricSpikeAnalyzer, SpikeVerdict};

/// Confidence attached to anomalies from the rule-based detectors
pub const RULE_CONFIDENCE: f64 = 1.0;
