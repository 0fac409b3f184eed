//! Scripted statistics source for exercising client subscriptions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;

use crate::domain::foundation::{ClientId, Timestamp};
use crate::domain::push::{ConnectedPayload, PushFrame};
use crate::domain::stats::{DashboardStats, DateRange, StatsSnapshot};
use crate::ports::{PushStream, SourceError, StatsSource};

type FrameSender = mpsc::UnboundedSender<Result<PushFrame, SourceError>>;

/// How the next `open_stream` call behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Open a stream; with `ack` the `connected` frame is queued immediately.
    Accept { ack: bool },
    Refuse(SourceError),
}

/// A fake server: scripted connection outcomes, hand-fed frames, counted
/// on-demand fetches.
///
/// `open_stream` consumes scripted outcomes in order and falls back to the
/// default outcome once the script runs out. On-demand snapshots report the
/// 1-based fetch number in `total_events`.
pub struct ScriptedStatsSource {
    script: Mutex<VecDeque<OpenOutcome>>,
    default_outcome: Mutex<OpenOutcome>,
    opens: Mutex<Vec<Option<DateRange>>>,
    connections: Mutex<Vec<FrameSender>>,
    fetches: Mutex<Vec<Option<DateRange>>>,
    fetch_delay: Mutex<Duration>,
    fetch_failures: AtomicUsize,
    fetch_sequence: AtomicI64,
}

impl ScriptedStatsSource {
    /// A source whose connections are accepted and acknowledged.
    pub fn new() -> Self {
        Self::with_default(OpenOutcome::Accept { ack: true })
    }

    pub fn with_default(outcome: OpenOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(outcome),
            opens: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            fetch_delay: Mutex::new(Duration::ZERO),
            fetch_failures: AtomicUsize::new(0),
            fetch_sequence: AtomicI64::new(0),
        }
    }

    /// Queues outcomes for the next `open_stream` calls.
    pub fn script_opens(&self, outcomes: impl IntoIterator<Item = OpenOutcome>) {
        lock(&self.script).extend(outcomes);
    }

    pub fn set_default(&self, outcome: OpenOutcome) {
        *lock(&self.default_outcome) = outcome;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *lock(&self.fetch_delay) = delay;
    }

    /// The next `count` fetches fail.
    pub fn fail_fetches(&self, count: usize) {
        self.fetch_failures.store(count, Ordering::SeqCst);
    }

    /// Filters of every `open_stream` call, in order.
    pub fn opens(&self) -> Vec<Option<DateRange>> {
        lock(&self.opens).clone()
    }

    /// Filters of every `fetch_snapshot` call, in order.
    pub fn fetches(&self) -> Vec<Option<DateRange>> {
        lock(&self.fetches).clone()
    }

    /// Sends a frame on the most recently opened connection.
    pub fn push(&self, frame: PushFrame) -> bool {
        lock(&self.connections)
            .last()
            .is_some_and(|tx| tx.unbounded_send(Ok(frame)).is_ok())
    }

    /// Sends `snapshot` as a `stats-update` on the latest connection.
    pub fn push_snapshot(&self, snapshot: StatsSnapshot) -> bool {
        self.push(PushFrame::StatsUpdate(snapshot))
    }

    /// Ends the most recently opened connection.
    pub fn drop_connection(&self) {
        if let Some(tx) = lock(&self.connections).last() {
            tx.close_channel();
        }
    }

    /// Delivers a transport error on the latest connection, then ends it.
    pub fn fail_connection(&self, error: SourceError) {
        if let Some(tx) = lock(&self.connections).last() {
            let _ = tx.unbounded_send(Err(error));
            tx.close_channel();
        }
    }

    /// Number of connections whose stream is still being read.
    pub fn live_connections(&self) -> usize {
        lock(&self.connections)
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl Default for ScriptedStatsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatsSource for ScriptedStatsSource {
    async fn open_stream(&self, filter: Option<&DateRange>) -> Result<PushStream, SourceError> {
        lock(&self.opens).push(filter.copied());
        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| lock(&self.default_outcome).clone());

        match outcome {
            OpenOutcome::Refuse(error) => Err(error),
            OpenOutcome::Accept { ack } => {
                let (tx, rx) = mpsc::unbounded();
                if ack {
                    let payload = ConnectedPayload::new(ClientId::new(), Timestamp::now());
                    let _ = tx.unbounded_send(Ok(PushFrame::Connected(payload)));
                }
                lock(&self.connections).push(tx);
                Ok(rx.boxed())
            }
        }
    }

    async fn fetch_snapshot(&self, filter: Option<&DateRange>) -> Result<StatsSnapshot, SourceError> {
        let generated_at = Timestamp::now();
        lock(&self.fetches).push(filter.copied());

        let delay = *lock(&self.fetch_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SourceError::Transport("scripted fetch failure".to_string()));
        }

        let sequence = self.fetch_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let stats = DashboardStats {
            total_events: sequence,
            ..Default::default()
        };
        Ok(StatsSnapshot::new(stats, filter.copied(), generated_at))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
