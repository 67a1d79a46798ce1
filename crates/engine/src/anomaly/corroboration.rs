//! Multi-window corroboration of metric spikes
//!
//! Re-scores the metric over shorter windows ending now against the same
//! baseline. The result only enriches evidence; it never changes a verdict.

use chrono::{DateTime, Utc};

use super::baseline::MetricWindows;
use crate::models::WindowCorroboration;
use crate::stats::{mean, zscore, BaselineStatistics};

/// z-score at which a comparison window counts as anomalous
pub const CORROBORATION_ZSCORE: f64 = 1.5;

/// Checks a metric over a list of comparison windows
pub struct Corroborator<'a> {
    window_hours: &'a [u32],
}

impl<'a> Corroborator<'a> {
    pub fn new(window_hours: &'a [u32]) -> Self {
        Self { window_hours }
    }

    /// Score each window `[now - hours, now)`; windows without samples are omitted
    pub fn corroborate(
        &self,
        baseline: &BaselineStatistics,
        windows: &MetricWindows,
        now: DateTime<Utc>,
    ) -> Vec<WindowCorroboration> {
        self.window_hours
            .iter()
            .filter_map(|&hours| {
                let start = now - chrono::Duration::hours(i64::from(hours));
                let values = windows.values_between(start, now);
                if values.is_empty() {
                    return None;
                }

                let z = zscore(mean(&values), baseline);
                Some(WindowCorroboration {
                    window_hours: hours,
                    zscore: z,
                    sample_count: values.len(),
                    anomaly: z >= CORROBORATION_ZSCORE,
                })
            })
            .collect()
    }

    /// Number of windows that agree the metric is anomalous
    pub fn agreeing(evidence: &[WindowCorroboration]) -> usize {
        evidence.iter().filter(|w| w.anomaly).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricKind, MetricSample};
    use crate::stats::stats;

    fn now() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    /// Baseline of 10 +/- 1 for hours 2..24, then 30 for the most recent hour
    fn step_windows() -> MetricWindows {
        let baseline = (61..=24 * 60)
            .map(|m| {
                let v = if m % 2 == 0 { 9.0 } else { 11.0 };
                MetricSample::new(now() - chrono::Duration::minutes(m), v)
            })
            .collect();
        let recent = (1..=60)
            .map(|m| MetricSample::new(now() - chrono::Duration::minutes(m), 30.0))
            .collect();
        MetricWindows::new(MetricKind::Cpu, baseline, recent)
    }

    #[test]
    fn test_shorter_windows_score_higher() {
        let windows = step_windows();
        let baseline = stats(&windows.baseline_values());
        let evidence = Corroborator::new(&[1, 3, 6]).corroborate(&baseline, &windows, now());

        assert_eq!(evidence.len(), 3);
        assert_eq!(evidence[0].window_hours, 1);
        assert_eq!(evidence[0].sample_count, 60);
        assert!(evidence[0].zscore > evidence[1].zscore);
        assert!(evidence[1].zscore > evidence[2].zscore);
        assert!(evidence.iter().all(|w| w.anomaly));
        assert_eq!(Corroborator::agreeing(&evidence), 3);
    }

    #[test]
    fn test_window_without_samples_omitted() {
        let windows = MetricWindows::new(
            MetricKind::Disk,
            vec![MetricSample::new(now() - chrono::Duration::hours(5), 1.0)],
            Vec::new(),
        );
        let baseline = BaselineStatistics::default();
        let evidence = Corroborator::new(&[1, 6]).corroborate(&baseline, &windows, now());

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].window_hours, 6);
        assert!(!evidence[0].anomaly);
    }
}
