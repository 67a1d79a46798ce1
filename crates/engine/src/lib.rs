//! Statistical anomaly detection engine for fleet telemetry
//!
//! This crate provides the core functionality for:
//! - Baseline statistics, z-scores and trend fitting
//! - Metric spike detection with multi-window corroboration
//! - Log and lifecycle-event detectors (IP bursts, error rates, restart loops)
//! - Threshold configuration, health checks and observability

pub mod anomaly;
pub mod catalog;
pub mod clock;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod stats;
pub mod store;
pub mod summary;
pub mod thresholds;

pub use catalog::{AnomalyCatalog, AnomalyTypeInfo, SeverityLevelInfo};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{
    sort_anomalies, AnomalyEngine, DetectionReport, DetectorFailure, DetectorKind,
    DEFAULT_QUERY_TIMEOUT,
};
pub use error::{ConfigError, DetectionError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use store::{InMemoryStore, TelemetryStore};
pub use summary::{AnomalyDigest, AnomalyFilter, AnomalySummary};
pub use thresholds::{AnomalyThresholds, ThresholdPreset};
