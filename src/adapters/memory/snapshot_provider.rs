//! Scripted snapshot provider for tests and demos.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::domain::stats::{DashboardStats, DateRange, StatsSnapshot};
use crate::ports::{SnapshotError, SnapshotProvider};

/// Snapshot provider with recorded calls, injectable latency and failures.
///
/// Every computed snapshot reports its 1-based sequence number in
/// `total_events`, so tests can tell computations apart and check that
/// clients received the same one.
#[derive(Default)]
pub struct ScriptedProvider {
    calls: Mutex<Vec<Option<DateRange>>>,
    failures_remaining: AtomicUsize,
    delay: Mutex<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every computation takes `delay` (tokio time).
    pub fn with_delay(delay: Duration) -> Self {
        let provider = Self::new();
        *provider.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
        provider
    }

    /// The next `count` computations fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Filters of every call so far, in order.
    pub fn calls(&self) -> Vec<Option<DateRange>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Builds a snapshot without recording a call.
    pub fn snapshot_at(&self, filter: Option<DateRange>, generated_at: Timestamp) -> StatsSnapshot {
        StatsSnapshot::new(DashboardStats::default(), filter, generated_at)
    }
}

#[async_trait]
impl SnapshotProvider for ScriptedProvider {
    async fn compute_snapshot(
        &self,
        filter: Option<DateRange>,
    ) -> Result<StatsSnapshot, SnapshotError> {
        let generated_at = Timestamp::now();
        let sequence = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(filter);
            calls.len() as i64
        };

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SnapshotError::Unavailable("scripted failure".to_string()));
        }

        let stats = DashboardStats {
            total_events: sequence,
            ..Default::default()
        };
        Ok(StatsSnapshot::new(stats, filter, generated_at))
    }
}
