//! Client-side subscription services.
//!
//! `RequestQueue` spaces out on-demand fetches; `ResilientSubscription`
//! drives the subscription machine against a `StatsSource`.

mod request_queue;
mod subscription;

pub use request_queue::RequestQueue;
pub use subscription::{subscribe_with_spacing, RefreshError, ResilientSubscription};
