//! StatsSource port - The client's view of the statistics server.
//!
//! A subscription needs two things from the server: a push stream for a
//! given filter and a one-shot snapshot for on-demand refresh.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::push::PushFrame;
use crate::domain::stats::{DateRange, StatsSnapshot};

/// A stream of decoded push frames; ends when the connection closes.
pub type PushStream = BoxStream<'static, Result<PushFrame, SourceError>>;

/// Client-side port onto the statistics server.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Opens a push connection addressed with `filter`.
    ///
    /// Returns [`SourceError::Unsupported`] if the server does not offer a
    /// push stream at all.
    async fn open_stream(&self, filter: Option<&DateRange>) -> Result<PushStream, SourceError>;

    /// Fetches one snapshot on demand, bypassing every cache.
    async fn fetch_snapshot(&self, filter: Option<&DateRange>) -> Result<StatsSnapshot, SourceError>;
}

/// Errors talking to the statistics server
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server responded with status {status}")]
    Status { status: u16 },

    #[error("Server does not offer a push stream")]
    Unsupported,

    #[error("Malformed payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SourceError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => SourceError::Status {
                status: status.as_u16(),
            },
            None => SourceError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}
