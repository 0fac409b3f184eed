//! Statistics snapshot: one computed, timestamped dashboard payload.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::DateRange;

/// Order counts grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersByStatus {
    pub pending: i64,
    pub confirmed: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub total: i64,
}

/// Number of events created in one calendar month (`YYYY-MM`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCount {
    pub month: String,
    pub count: i64,
}

/// Number of events of one type; `value` keeps chart libraries happy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEvent {
    pub id: i32,
    pub title: String,
    pub event_type: String,
    pub status: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentOrder {
    pub id: i32,
    pub event_id: i32,
    pub status: String,
    pub total_amount: f64,
    pub guest_count: i32,
    pub date: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTotals {
    pub orders_this_month: i64,
    pub confirmed_revenue: f64,
}

/// Aggregated dashboard figures.
///
/// The default value (all zeros, empty lists) is what a filter that matches
/// no records legitimately produces; it is displayed as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_events: i64,
    pub total_users: i64,
    pub total_orders: i64,
    pub total_revenue: f64,
    pub confirmed_orders_revenue: f64,
    pub orders_by_status: OrdersByStatus,
    pub events_per_month: Vec<MonthlyCount>,
    pub event_categories: Vec<CategoryCount>,
    pub recent_events: Vec<RecentEvent>,
    pub recent_orders: Vec<RecentOrder>,
    pub dashboard_totals: DashboardTotals,
}

/// A snapshot as delivered to clients: the stats plus the time they were
/// generated and the filter they were computed for.
///
/// Serializes flat: `{ ...stats, "generatedAt": ..., "dateFilter": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub stats: DashboardStats,
    pub generated_at: Timestamp,
    #[serde(default)]
    pub date_filter: Option<DateRange>,
}

impl StatsSnapshot {
    /// Wraps stats computed for `filter`, generated at `generated_at`.
    pub fn new(stats: DashboardStats, filter: Option<DateRange>, generated_at: Timestamp) -> Self {
        Self {
            stats,
            generated_at,
            date_filter: filter,
        }
    }

    /// True if this snapshot is older than the last one applied.
    ///
    /// Equal timestamps are not stale.
    pub fn is_older_than(&self, last_applied: Option<Timestamp>) -> bool {
        last_applied.is_some_and(|last| self.generated_at.is_before(&last))
    }

    /// True if this snapshot was computed for `filter`.
    pub fn matches_filter(&self, filter: Option<&DateRange>) -> bool {
        self.date_filter.as_ref() == filter
    }
}
