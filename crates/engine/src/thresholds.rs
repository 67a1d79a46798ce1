//! Detection thresholds
//!
//! Thresholds are loaded once per process from the environment (prefix
//! `ANOMALY_`), starting from a named preset. Every key can be overridden
//! independently, e.g. `ANOMALY_CPU_ZSCORE_THRESHOLD=3.5` or
//! `ANOMALY_COMPARISON_WINDOWS=1,3,12`. Invalid values fail at load time,
//! never during detection.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::MetricKind;
use crate::stats::DEFAULT_TREND_WINDOW;

/// Environment prefix for threshold keys
pub const ENV_PREFIX: &str = "ANOMALY";

/// Environment variable selecting the base preset
pub const PRESET_VAR: &str = "ANOMALY_PRESET";

/// Named starting points for threshold tuning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThresholdPreset {
    #[default]
    Default,
    Sensitive,
    Conservative,
}

impl FromStr for ThresholdPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(ThresholdPreset::Default),
            "sensitive" => Ok(ThresholdPreset::Sensitive),
            "conservative" => Ok(ThresholdPreset::Conservative),
            _ => Err(ConfigError::UnknownPreset(s.to_string())),
        }
    }
}

impl fmt::Display for ThresholdPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdPreset::Default => write!(f, "default"),
            ThresholdPreset::Sensitive => write!(f, "sensitive"),
            ThresholdPreset::Conservative => write!(f, "conservative"),
        }
    }
}

/// Read-only threshold snapshot for detection runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    /// Minimum baseline z-score of the recent mean to flag a cpu spike
    pub cpu_zscore_threshold: f64,
    pub memory_zscore_threshold: f64,
    pub disk_zscore_threshold: f64,
    pub connections_zscore_threshold: f64,

    /// Percentage increase over the baseline mean (fallback rule)
    pub cpu_spike_threshold: f64,
    pub memory_spike_threshold: f64,
    pub disk_spike_threshold: f64,
    pub connections_percent_threshold: f64,

    /// Absolute increase in mean tcp connections (fallback rule)
    pub connection_spike_threshold: f64,

    /// Requests from one public IP within the lookback window
    pub ip_request_threshold: usize,
    /// Error percentage per container
    pub error_rate_threshold: f64,
    /// Lifecycle events within the lookback window
    pub event_volume_threshold: usize,
    /// Restart events per container within the lookback window
    pub container_restart_threshold: usize,

    pub min_baseline_samples: usize,
    pub min_recent_samples: usize,

    /// Metric anomalies below this confidence are not surfaced
    pub min_confidence: f64,
    /// Confidence required for HIGH at the critical z-score cut
    pub high_confidence: f64,

    /// Moving-average window for trend fitting over the recent samples
    pub trend_window: usize,

    /// Default recent window when a query does not name one
    pub lookback_hours: u32,
    /// Start of the baseline window; queries must look back less than this
    pub baseline_hours: u32,
    /// Sub-windows (hours) used to corroborate metric spikes
    pub comparison_windows: Vec<u32>,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self::for_preset(ThresholdPreset::Default)
    }
}

impl AnomalyThresholds {
    /// Threshold values for a preset
    pub fn for_preset(preset: ThresholdPreset) -> Self {
        let base = Self {
            cpu_zscore_threshold: 2.5,
            memory_zscore_threshold: 2.5,
            disk_zscore_threshold: 3.0,
            connections_zscore_threshold: 3.0,
            cpu_spike_threshold: 30.0,
            memory_spike_threshold: 25.0,
            disk_spike_threshold: 20.0,
            connections_percent_threshold: 50.0,
            connection_spike_threshold: 500.0,
            ip_request_threshold: 100,
            error_rate_threshold: 10.0,
            event_volume_threshold: 100,
            container_restart_threshold: 5,
            min_baseline_samples: 20,
            min_recent_samples: 5,
            min_confidence: 0.1,
            high_confidence: 0.9,
            trend_window: DEFAULT_TREND_WINDOW,
            lookback_hours: 1,
            baseline_hours: 24,
            comparison_windows: vec![1, 3, 6],
        };

        match preset {
            ThresholdPreset::Default => base,
            ThresholdPreset::Sensitive => Self {
                cpu_zscore_threshold: 2.0,
                memory_zscore_threshold: 2.0,
                disk_zscore_threshold: 2.5,
                connections_zscore_threshold: 2.5,
                cpu_spike_threshold: 20.0,
                memory_spike_threshold: 15.0,
                disk_spike_threshold: 10.0,
                connections_percent_threshold: 30.0,
                connection_spike_threshold: 300.0,
                ip_request_threshold: 50,
                error_rate_threshold: 5.0,
                event_volume_threshold: 50,
                container_restart_threshold: 3,
                min_confidence: 0.05,
                high_confidence: 0.85,
                ..base
            },
            ThresholdPreset::Conservative => Self {
                cpu_zscore_threshold: 3.0,
                memory_zscore_threshold: 3.0,
                disk_zscore_threshold: 4.0,
                connections_zscore_threshold: 4.0,
                cpu_spike_threshold: 50.0,
                memory_spike_threshold: 40.0,
                disk_spike_threshold: 30.0,
                connections_percent_threshold: 100.0,
                connection_spike_threshold: 1000.0,
                ip_request_threshold: 250,
                error_rate_threshold: 20.0,
                event_volume_threshold: 250,
                container_restart_threshold: 10,
                min_baseline_samples: 30,
                min_confidence: 0.3,
                high_confidence: 0.95,
                ..base
            },
        }
    }

    /// Load thresholds from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load thresholds from an explicit variable map, or the process
    /// environment when `vars` is `None`
    pub fn load_from(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let preset_name = match &vars {
            Some(map) => map.get(PRESET_VAR).cloned(),
            None => std::env::var(PRESET_VAR).ok(),
        };
        let preset = preset_name
            .as_deref()
            .map(str::parse::<ThresholdPreset>)
            .transpose()?
            .unwrap_or_default();

        let base = Self::for_preset(preset);
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&base)?)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("comparison_windows")
                    .source(vars),
            )
            .build()?;

        let thresholds: Self = settings.try_deserialize()?;
        thresholds.validate()?;

        tracing::info!(
            preset = %preset,
            lookback_hours = thresholds.lookback_hours,
            baseline_hours = thresholds.baseline_hours,
            "Anomaly thresholds loaded"
        );

        Ok(thresholds)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("cpu_zscore_threshold", self.cpu_zscore_threshold),
            ("memory_zscore_threshold", self.memory_zscore_threshold),
            ("disk_zscore_threshold", self.disk_zscore_threshold),
            ("connections_zscore_threshold", self.connections_zscore_threshold),
            ("cpu_spike_threshold", self.cpu_spike_threshold),
            ("memory_spike_threshold", self.memory_spike_threshold),
            ("disk_spike_threshold", self.disk_spike_threshold),
            ("connections_percent_threshold", self.connections_percent_threshold),
            ("connection_spike_threshold", self.connection_spike_threshold),
            ("error_rate_threshold", self.error_rate_threshold),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(key, format!("must be a positive number, got {}", value)));
            }
        }

        if self.error_rate_threshold > 100.0 {
            return Err(invalid("error_rate_threshold", "must not exceed 100"));
        }
        if self.ip_request_threshold == 0 {
            return Err(invalid("ip_request_threshold", "must be at least 1"));
        }
        if self.event_volume_threshold == 0 {
            return Err(invalid("event_volume_threshold", "must be at least 1"));
        }
        if self.min_baseline_samples < 2 {
            return Err(invalid("min_baseline_samples", "must be at least 2"));
        }
        if self.min_recent_samples == 0 {
            return Err(invalid("min_recent_samples", "must be at least 1"));
        }

        for (key, value) in [
            ("min_confidence", self.min_confidence),
            ("high_confidence", self.high_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, format!("must be within [0, 1], got {}", value)));
            }
        }
        if self.high_confidence < self.min_confidence {
            return Err(invalid("high_confidence", "must not be below min_confidence"));
        }

        if self.trend_window < 2 {
            return Err(invalid("trend_window", "must be at least 2"));
        }

        if self.lookback_hours == 0 {
            return Err(invalid("lookback_hours", "must be at least 1"));
        }
        if self.baseline_hours <= self.lookback_hours {
            return Err(invalid(
                "baseline_hours",
                format!(
                    "must exceed lookback_hours ({} <= {})",
                    self.baseline_hours, self.lookback_hours
                ),
            ));
        }
        if self.comparison_windows.is_empty() {
            return Err(invalid("comparison_windows", "must list at least one window"));
        }
        if self.comparison_windows.contains(&0) {
            return Err(invalid("comparison_windows", "windows must be at least 1 hour"));
        }

        Ok(())
    }

    /// z-score threshold for a metric
    pub fn zscore_for(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Cpu => self.cpu_zscore_threshold,
            MetricKind::Memory => self.memory_zscore_threshold,
            MetricKind::Disk => self.disk_zscore_threshold,
            MetricKind::TcpConnections => self.connections_zscore_threshold,
        }
    }

    /// Percentage-increase threshold for a metric
    pub fn percent_for(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Cpu => self.cpu_spike_threshold,
            MetricKind::Memory => self.memory_spike_threshold,
            MetricKind::Disk => self.disk_spike_threshold,
            MetricKind::TcpConnections => self.connections_percent_threshold,
        }
    }

    /// Absolute-increase threshold; only tcp connections have one
    pub fn absolute_for(&self, metric: MetricKind) -> Option<f64> {
        match metric {
            MetricKind::TcpConnections => Some(self.connection_spike_threshold),
            _ => None,
        }
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_default_thresholds_are_valid() {
        for preset in [
            ThresholdPreset::Default,
            ThresholdPreset::Sensitive,
            ThresholdPreset::Conservative,
        ] {
            AnomalyThresholds::for_preset(preset).validate().unwrap();
        }
    }

    #[test]
    fn test_load_without_overrides_matches_default() {
        let loaded = AnomalyThresholds::load_from(vars(&[])).unwrap();
        assert_eq!(loaded, AnomalyThresholds::default());
    }

    #[test]
    fn test_load_applies_individual_overrides() {
        let loaded = AnomalyThresholds::load_from(vars(&[
            ("ANOMALY_CPU_ZSCORE_THRESHOLD", "3.5"),
            ("ANOMALY_IP_REQUEST_THRESHOLD", "250"),
            ("ANOMALY_COMPARISON_WINDOWS", "1,2,12"),
        ]))
        .unwrap();

        assert_eq!(loaded.cpu_zscore_threshold, 3.5);
        assert_eq!(loaded.ip_request_threshold, 250);
        assert_eq!(loaded.comparison_windows, vec![1, 2, 12]);
        assert_eq!(loaded.memory_zscore_threshold, 2.5);
    }

    #[test]
    fn test_trend_window_override() {
        let loaded =
            AnomalyThresholds::load_from(vars(&[("ANOMALY_TREND_WINDOW", "10")])).unwrap();
        assert_eq!(loaded.trend_window, 10);

        let err = AnomalyThresholds::load_from(vars(&[("ANOMALY_TREND_WINDOW", "1")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "trend_window",
                ..
            }
        ));
    }

    #[test]
    fn test_load_preset_then_override() {
        let loaded = AnomalyThresholds::load_from(vars(&[
            ("ANOMALY_PRESET", "conservative"),
            ("ANOMALY_ERROR_RATE_THRESHOLD", "15"),
        ]))
        .unwrap();

        assert_eq!(loaded.cpu_zscore_threshold, 3.0);
        assert_eq!(loaded.error_rate_threshold, 15.0);
    }

    #[test]
    fn test_unknown_preset_fails_fast() {
        let err = AnomalyThresholds::load_from(vars(&[("ANOMALY_PRESET", "paranoid")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPreset(name) if name == "paranoid"));
    }

    #[test]
    fn test_invalid_value_fails_fast() {
        let err = AnomalyThresholds::load_from(vars(&[("ANOMALY_MIN_CONFIDENCE", "1.5")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "min_confidence",
                ..
            }
        ));
    }

    #[test]
    fn test_non_numeric_value_fails_fast() {
        let result =
            AnomalyThresholds::load_from(vars(&[("ANOMALY_DISK_ZSCORE_THRESHOLD", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_baseline_must_exceed_lookback() {
        let thresholds = AnomalyThresholds {
            lookback_hours: 24,
            baseline_hours: 24,
            ..Default::default()
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_per_metric_lookup() {
        let t = AnomalyThresholds::default();
        assert_eq!(t.zscore_for(MetricKind::Disk), 3.0);
        assert_eq!(t.percent_for(MetricKind::Memory), 25.0);
        assert_eq!(t.absolute_for(MetricKind::TcpConnections), Some(500.0));
        assert_eq!(t.absolute_for(MetricKind::Cpu), None);
    }
}
