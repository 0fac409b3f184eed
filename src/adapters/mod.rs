//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `events` - In-process change bus
//! - `sse` - Broadcast manager and the Server-Sent Events stream
//! - `http` - REST handlers and router assembly
//! - `postgres` - Snapshot computation over the primary database
//! - `client` - Dashboard-side HTTP/SSE access to the server
//! - `memory` - Scripted in-memory doubles for tests and local runs

pub mod client;
pub mod events;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod sse;

pub use client::HttpStatsSource;
pub use events::InMemoryChangeBus;
pub use http::{serve_until, stats_router, StatsAppState};
pub use postgres::PostgresSnapshotProvider;
pub use sse::{BroadcastManager, BroadcastSettings};
