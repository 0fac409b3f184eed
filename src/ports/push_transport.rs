//! PushTransport port - The write half of one client's push connection.
//!
//! The broadcast manager only ever writes whole messages and closes; how the
//! bytes reach the client (SSE over HTTP, a test channel) is the adapter's
//! business.

use async_trait::async_trait;

use crate::domain::push::PushMessage;

/// Write half of a single push connection.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Delivers one message. An error means the connection is unusable and
    /// the client should be dropped.
    async fn send(&self, message: PushMessage) -> Result<(), TransportError>;

    /// Closes the connection. Idempotent.
    async fn close(&self);
}

/// Errors from writing to a push connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Push connection closed")]
    Closed,

    #[error("Push connection is not draining; outbound buffer full")]
    Backpressure,
}
