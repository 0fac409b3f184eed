//! Application layer - Services that coordinate domain logic with ports.
//!
//! The server side needs no orchestration beyond the broadcast manager, so
//! this layer holds the dashboard-facing subscription services.

pub mod subscription;

pub use subscription::{RefreshError, RequestQueue, ResilientSubscription};
