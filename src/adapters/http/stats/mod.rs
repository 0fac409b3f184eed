//! Statistics HTTP adapter.
//!
//! On-demand snapshots, the manual trigger and health, plus the router that
//! also mounts the push stream.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, FilterParams, HealthResponse, TriggerAck};
pub use handlers::{basic_stats, health, trigger_update, StatsApiError, StatsAppState};
pub use routes::{stats_router, stats_routes};
