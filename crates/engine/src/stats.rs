//! Descriptive statistics and trend fitting
//!
//! Pure functions over ordered `f64` windows. Nothing here fails: degenerate
//! inputs (too few samples, zero variance) produce zeroed results instead of
//! NaN or infinity.

use serde::{Deserialize, Serialize};

/// Default moving-average window for trend fitting
pub const DEFAULT_TREND_WINDOW: usize = 5;

/// Slopes with a smaller magnitude are classified as stable
const STABLE_SLOPE_THRESHOLD: f64 = 0.1;

/// Summary statistics of a baseline window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineStatistics {
    pub mean: f64,
    /// Sample standard deviation (Bessel's correction)
    pub stddev: f64,
    pub median: f64,
    pub p75: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
}

/// Direction of a fitted trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Stable,
    Increasing,
    Decreasing,
    InsufficientData,
    Error,
}

/// Result of fitting a linear trend to a smoothed series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    /// Change per sample of the moving-average series
    pub slope: f64,
    /// Goodness of fit in [0, 1]
    pub consistency: f64,
}

impl TrendAnalysis {
    pub fn insufficient_data() -> Self {
        Self {
            direction: TrendDirection::InsufficientData,
            slope: 0.0,
            consistency: 0.0,
        }
    }

    pub fn error() -> Self {
        Self {
            direction: TrendDirection::Error,
            slope: 0.0,
            consistency: 0.0,
        }
    }

    /// True when the series is moving in either direction
    pub fn is_trending(&self) -> bool {
        matches!(
            self.direction,
            TrendDirection::Increasing | TrendDirection::Decreasing
        )
    }
}

/// Arithmetic mean, 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median, 0 for an empty slice
pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Quantile `q` in [0, 1] using linear interpolation between closest ranks
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, q)
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let q = q.clamp(0.0, 1.0);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Compute baseline statistics; all zeros for fewer than two samples
pub fn stats(values: &[f64]) -> BaselineStatistics {
    if values.len() < 2 {
        return BaselineStatistics::default();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mean = mean(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() - 1) as f64;

    BaselineStatistics {
        mean,
        stddev: variance.sqrt(),
        median: quantile_sorted(&sorted, 0.5),
        p75: quantile_sorted(&sorted, 0.75),
        p95: quantile_sorted(&sorted, 0.95),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
    }
}

/// Absolute z-score of `value` against a baseline
///
/// Returns 0 when the baseline has no spread.
pub fn zscore(value: f64, stats: &BaselineStatistics) -> f64 {
    if stats.stddev <= 0.0 || !stats.stddev.is_finite() {
        return 0.0;
    }

    let z = (value - stats.mean).abs() / stats.stddev;
    if z.is_finite() {
        z
    } else {
        0.0
    }
}

/// Logistic function
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fit a linear trend to the moving average of `values`
///
/// # Arguments
/// * `values` - Ordered samples
/// * `window` - Moving-average window size
///
/// # Returns
/// * `InsufficientData` if there are fewer samples than `window`
/// * `Error` if any sample is not finite
/// * Otherwise the slope per sample and its goodness of fit
pub fn trend(values: &[f64], window: usize) -> TrendAnalysis {
    let window = window.max(1);
    if values.len() < window {
        return TrendAnalysis::insufficient_data();
    }
    if values.iter().any(|v| !v.is_finite()) {
        return TrendAnalysis::error();
    }

    let smoothed = moving_average(values, window);
    let slope = least_squares_slope(&smoothed);
    let consistency = fit_consistency(&smoothed, slope);

    let direction = if slope.abs() < STABLE_SLOPE_THRESHOLD {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    TrendAnalysis {
        direction,
        slope,
        consistency,
    }
}

fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

/// Slope of the least-squares line through `(i, series[i])`
fn least_squares_slope(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }

    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = mean(series);

    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (i, y) in series.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sum_xy += dx * (y - mean_y);
        sum_xx += dx * dx;
    }

    if sum_xx < f64::EPSILON {
        return 0.0;
    }

    sum_xy / sum_xx
}

/// `max(0, 1 - mse / variance)` of the fitted line, 0 for a flat series
fn fit_consistency(series: &[f64], slope: f64) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }

    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = mean(series);
    let intercept = mean_y - slope * mean_x;

    let variance = series.iter().map(|y| (y - mean_y).powi(2)).sum::<f64>() / n as f64;
    if variance < f64::EPSILON {
        return 0.0;
    }

    let mse = series
        .iter()
        .enumerate()
        .map(|(i, y)| (y - (slope * i as f64 + intercept)).powi(2))
        .sum::<f64>()
        / n as f64;

    (1.0 - mse / variance).clamp(0.0, 1.0)
}
