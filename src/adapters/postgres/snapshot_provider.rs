//! PostgreSQL implementation of SnapshotProvider.
//!
//! Aggregates the dashboard figures from the `events`, `orders` and `users`
//! tables. Every aggregate honours the optional `[start, end)` filter on
//! `created_at`; a filter matching nothing yields an all-zero payload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::foundation::Timestamp;
use crate::domain::stats::{
    CategoryCount, DashboardStats, DashboardTotals, DateRange, MonthlyCount, OrdersByStatus,
    RecentEvent, RecentOrder, StatsSnapshot,
};
use crate::ports::{SnapshotError, SnapshotProvider};

const RECENT_LIMIT: i64 = 5;

/// Bound pair shared by every query; `NULL` bounds disable the filter.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl From<Option<DateRange>> for Bounds {
    fn from(filter: Option<DateRange>) -> Self {
        Self {
            start: filter.map(|r| *r.start.as_datetime()),
            end: filter.map(|r| *r.end.as_datetime()),
        }
    }
}

/// PostgreSQL implementation of SnapshotProvider.
#[derive(Clone)]
pub struct PostgresSnapshotProvider {
    pool: PgPool,
}

impl PostgresSnapshotProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count_rows(&self, table: &'static str, bounds: Bounds) -> Result<i64, SnapshotError> {
        let sql = format!(
            r#"
            SELECT COUNT(*) AS count FROM {table}
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            "#
        );
        let row = sqlx::query(&sql)
            .bind(bounds.start)
            .bind(bounds.end)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    async fn revenue_for_status(
        &self,
        status: &'static str,
        bounds: Bounds,
    ) -> Result<f64, SnapshotError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(total_amount), 0)::float8 AS total FROM orders
            WHERE status = $3
              AND ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            "#,
        )
        .bind(bounds.start)
        .bind(bounds.end)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    async fn orders_by_status(&self, bounds: Bounds) -> Result<OrdersByStatus, SnapshotError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count FROM orders
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            GROUP BY status
            "#,
        )
        .bind(bounds.start)
        .bind(bounds.end)
        .fetch_all(&self.pool)
        .await?;

        let mut by_status = OrdersByStatus::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            match status.as_str() {
                "pending" => by_status.pending += count,
                "confirmed" => by_status.confirmed += count,
                "completed" => by_status.completed += count,
                "cancelled" => by_status.cancelled += count,
                other => tracing::trace!(status = other, count, "Uncategorised order status"),
            }
            by_status.total += count;
        }
        Ok(by_status)
    }

    async fn events_per_month(&self, bounds: Bounds) -> Result<Vec<MonthlyCount>, SnapshotError> {
        let rows = sqlx::query(
            r#"
            SELECT to_char(created_at, 'YYYY-MM') AS month, COUNT(*) AS count FROM events
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            GROUP BY month
            ORDER BY month
            "#,
        )
        .bind(bounds.start)
        .bind(bounds.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MonthlyCount {
                month: row.get("month"),
                count: row.get("count"),
            })
            .collect())
    }

    async fn event_categories(&self, bounds: Bounds) -> Result<Vec<CategoryCount>, SnapshotError> {
        let rows = sqlx::query(
            r#"
            SELECT event_type AS name, COUNT(*) AS value FROM events
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            GROUP BY event_type
            ORDER BY value DESC, name
            "#,
        )
        .bind(bounds.start)
        .bind(bounds.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryCount {
                name: row.get("name"),
                value: row.get("value"),
            })
            .collect())
    }

    async fn recent_events(&self, bounds: Bounds) -> Result<Vec<RecentEvent>, SnapshotError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, event_type, status, created_at FROM events
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(bounds.start)
        .bind(bounds.end)
        .bind(RECENT_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let created_at: DateTime<Utc> = row.get("created_at");
                RecentEvent {
                    id: row.get("id"),
                    title: row.get("title"),
                    event_type: row.get("event_type"),
                    status: row.get("status"),
                    created_at: Timestamp::from_datetime(created_at),
                }
            })
            .collect())
    }

    async fn recent_orders(&self, bounds: Bounds) -> Result<Vec<RecentOrder>, SnapshotError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, status, total_amount::float8 AS total_amount, guest_count, date
            FROM orders
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(bounds.start)
        .bind(bounds.end)
        .bind(RECENT_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let date: DateTime<Utc> = row.get("date");
                RecentOrder {
                    id: row.get("id"),
                    event_id: row.get("event_id"),
                    status: row.get("status"),
                    total_amount: row.get("total_amount"),
                    guest_count: row.get("guest_count"),
                    date: Timestamp::from_datetime(date),
                }
            })
            .collect())
    }

    /// Orders created since the start of the current calendar month.
    async fn orders_this_month(&self, bounds: Bounds) -> Result<i64, SnapshotError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM orders
            WHERE created_at >= date_trunc('month', now())
              AND created_at <= now()
              AND ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            "#,
        )
        .bind(bounds.start)
        .bind(bounds.end)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }
}

#[async_trait]
impl SnapshotProvider for PostgresSnapshotProvider {
    #[tracing::instrument(skip(self), fields(filtered = filter.is_some()))]
    async fn compute_snapshot(
        &self,
        filter: Option<DateRange>,
    ) -> Result<StatsSnapshot, SnapshotError> {
        let generated_at = Timestamp::now();
        let bounds = Bounds::from(filter);

        let (total_events, total_users, total_orders, total_revenue, confirmed_revenue) = tokio::try_join!(
            self.count_rows("events", bounds),
            self.count_rows("users", bounds),
            self.count_rows("orders", bounds),
            self.revenue_for_status("completed", bounds),
            self.revenue_for_status("confirmed", bounds),
        )?;

        let (orders_by_status, events_per_month, event_categories, recent_events, recent_orders, orders_this_month) = tokio::try_join!(
            self.orders_by_status(bounds),
            self.events_per_month(bounds),
            self.event_categories(bounds),
            self.recent_events(bounds),
            self.recent_orders(bounds),
            self.orders_this_month(bounds),
        )?;

        let stats = DashboardStats {
            total_events,
            total_users,
            total_orders,
            total_revenue,
            confirmed_orders_revenue: confirmed_revenue,
            orders_by_status,
            events_per_month,
            event_categories,
            recent_events,
            recent_orders,
            dashboard_totals: DashboardTotals {
                orders_this_month,
                confirmed_revenue,
            },
        };

        tracing::debug!(
            total_events = stats.total_events,
            total_orders = stats.total_orders,
            elapsed_ms = Timestamp::now().duration_since(&generated_at).num_milliseconds(),
            "Snapshot computed"
        );

        Ok(StatsSnapshot::new(stats, filter, generated_at))
    }
}
