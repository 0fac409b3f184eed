//! Server-Sent Events push adapter.
//!
//! - `BroadcastManager` - Client registry, coalescing and fan-out
//! - `BroadcastTrigger` - Change bus listener that wakes the manager
//! - `SseTransport` - Bounded channel feeding one SSE response
//! - `stats_stream` - Axum handler for `GET /stats-stream`

mod handler;
mod manager;
mod transport;
mod trigger;

pub use handler::stats_stream;
pub use manager::{BroadcastManager, BroadcastReport, BroadcastSettings};
pub use transport::SseTransport;
pub use trigger::BroadcastTrigger;
