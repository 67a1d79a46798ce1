//! Error types for the anomaly engine

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a telemetry store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid telemetry data: {0}")]
    InvalidData(String),

    #[error("failed to read telemetry snapshot: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while loading or validating thresholds
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown threshold preset '{0}' (expected default, sensitive or conservative)")]
    UnknownPreset(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Failures of a single detector during a detection run
///
/// These never escape the orchestrator; they are logged and reported
/// alongside the anomalies of the detectors that did succeed.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("store query failed: {0}")]
    Store(#[from] StoreError),

    #[error("store query timed out after {0:?}")]
    Timeout(Duration),
}
