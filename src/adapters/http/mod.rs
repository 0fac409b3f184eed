//! HTTP adapters - REST API implementations.

mod server;
pub mod stats;

pub use server::serve_until;
pub use stats::{stats_router, StatsAppState};
