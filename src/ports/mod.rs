//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Server Ports
//!
//! - `SnapshotProvider` - Computes a statistics snapshot for a filter
//! - `ChangePublisher` / `ChangeSubscriber` - Process-wide change signal
//! - `ChangeListener` - Callback invoked on every change signal
//! - `PushTransport` - Write half of one client's push connection
//!
//! ## Client Ports
//!
//! - `StatsSource` - Push stream and on-demand snapshots from the server

mod change_bus;
mod push_transport;
mod snapshot_provider;
mod stats_source;

pub use change_bus::{
    ChangeBus, ChangeListener, ChangePublisher, ChangeSubscriber, ChangeSubscription, FnListener,
};
pub use push_transport::{PushTransport, TransportError};
pub use snapshot_provider::{SnapshotError, SnapshotProvider};
pub use stats_source::{PushStream, SourceError, StatsSource};
