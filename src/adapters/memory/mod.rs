//! In-memory adapters for tests and local experiments.
//!
//! - `ScriptedProvider` - Snapshot provider with call recording and fault injection
//! - `RecordingTransport` - Push transport that keeps every message
//! - `ScriptedStatsSource` - Fake server for driving client subscriptions

mod snapshot_provider;
mod stats_source;
mod transport;

pub use snapshot_provider::ScriptedProvider;
pub use stats_source::{OpenOutcome, ScriptedStatsSource};
pub use transport::RecordingTransport;
