//! Statistics domain - the payload pushed to dashboards and the filter
//! it is computed for.

mod filter;
mod snapshot;

pub use filter::DateRange;
pub use snapshot::{
    CategoryCount, DashboardStats, DashboardTotals, MonthlyCount, OrdersByStatus, RecentEvent,
    RecentOrder, StatsSnapshot,
};
