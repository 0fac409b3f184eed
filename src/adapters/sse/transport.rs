//! SSE transport: a bounded channel between the manager and one response
//! stream.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::push::PushMessage;
use crate::ports::{PushTransport, TransportError};

/// Write half of one SSE response.
///
/// The read half is the receiver returned by [`SseTransport::channel`],
/// which the HTTP handler turns into the response body. Writes never wait:
/// a client that stops draining its buffer is reported as
/// [`TransportError::Backpressure`] and dropped by the manager.
pub struct SseTransport {
    sender: Mutex<Option<mpsc::Sender<PushMessage>>>,
}

impl SseTransport {
    /// Creates a transport buffering up to `buffer` messages.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<PushMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, |tx| tx.is_closed())
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn send(&self, message: PushMessage) -> Result<(), TransportError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            return Err(TransportError::Closed);
        };

        sender.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    async fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
