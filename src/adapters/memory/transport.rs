//! Recording push transport for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::push::{PushEvent, PushMessage};
use crate::domain::stats::StatsSnapshot;
use crate::ports::{PushTransport, TransportError};

/// Push transport that records every message it accepts.
pub struct RecordingTransport {
    messages: Mutex<Vec<PushMessage>>,
    accept_limit: AtomicUsize,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::accepting(usize::MAX)
    }

    /// A transport whose every write fails.
    pub fn failing() -> Self {
        Self::accepting(0)
    }

    /// A transport that accepts `limit` messages, then fails.
    pub fn accepting(limit: usize) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            accept_limit: AtomicUsize::new(limit),
            closed: AtomicBool::new(false),
        }
    }

    /// Makes every further write fail.
    pub fn break_connection(&self) {
        self.accept_limit.store(0, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<PushMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events(&self) -> Vec<PushEvent> {
        self.messages().iter().map(|m| m.event).collect()
    }

    /// Decoded payloads of every `stats-update` received.
    pub fn stats_updates(&self) -> Vec<StatsSnapshot> {
        self.messages()
            .iter()
            .filter(|m| m.event == PushEvent::StatsUpdate)
            .filter_map(|m| serde_json::from_str(&m.data).ok())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn send(&self, message: PushMessage) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let accepted = self.accept_limit.load(Ordering::SeqCst);
        if accepted == 0 {
            return Err(TransportError::Closed);
        }
        self.accept_limit.store(accepted.saturating_sub(1), Ordering::SeqCst);
        messages.push(message);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
