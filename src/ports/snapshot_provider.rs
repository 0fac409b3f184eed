//! SnapshotProvider port - Computes dashboard statistics on demand.
//!
//! From the broadcast layer's point of view this is a pure, possibly slow,
//! possibly failing function of the filter. Callers must tolerate arbitrary
//! latency and outright rejection.

use async_trait::async_trait;

use crate::domain::stats::{DateRange, StatsSnapshot};

/// Read-only port for computing a statistics snapshot.
///
/// # Example
///
/// ```ignore
/// let snapshot = provider.compute_snapshot(Some(range)).await?;
/// assert_eq!(snapshot.date_filter, Some(range));
/// ```
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Computes a snapshot for `filter` (`None` = all data).
    ///
    /// The returned snapshot echoes `filter` and is stamped with the time
    /// the computation started.
    async fn compute_snapshot(
        &self,
        filter: Option<DateRange>,
    ) -> Result<StatsSnapshot, SnapshotError>;
}

/// Errors that can occur while computing a snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Snapshot computation timed out")]
    Timeout,

    #[error("Snapshot provider unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for SnapshotError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => SnapshotError::Timeout,
            other => SnapshotError::Database(other.to_string()),
        }
    }
}
