//! PostgreSQL adapters - Database implementation of the snapshot provider.

mod snapshot_provider;

pub use snapshot_provider::PostgresSnapshotProvider;
