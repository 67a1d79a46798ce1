//! Read-only access to persisted telemetry
//!
//! The engine never writes. Implementations wrap whatever holds the raw
//! telemetry (relational store, search index, an in-memory snapshot); every
//! query is bounded by the engine's query timeout.

mod memory;

pub use memory::{InMemoryStore, RawSample, TelemetrySnapshot};

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{DetectionError, StoreError};
use crate::models::{LifecycleEvent, LogEntry, MetricKind, MetricSample};

pub use async_trait::async_trait;

/// Trait for telemetry store implementations
///
/// All ranges are half-open: `start <= timestamp < end`. Results are ordered
/// by timestamp.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Numeric samples of one metric
    async fn fetch_metric_series(
        &self,
        metric: MetricKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, StoreError>;

    /// Log lines from every resource
    async fn fetch_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogEntry>, StoreError>;

    /// Lifecycle events from every resource
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LifecycleEvent>, StoreError>;
}

/// Run a store query under a deadline
pub(crate) async fn bounded<T, F>(timeout: Duration, query: F) -> Result<T, DetectionError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(result) => result.map_err(DetectionError::from),
        Err(_) => Err(DetectionError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through_results() {
        let ok: Result<u32, DetectionError> =
            bounded(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32, DetectionError> = bounded(Duration::from_secs(1), async {
            Err::<u32, _>(StoreError::Unavailable("connection refused".to_string()))
        })
        .await;
        assert!(matches!(err, Err(DetectionError::Store(_))));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), DetectionError> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await;

        assert!(matches!(result, Err(DetectionError::Timeout(_))));
    }
}
