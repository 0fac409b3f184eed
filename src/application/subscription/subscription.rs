//! Resilient subscription driver.
//!
//! A single task owns the [`SubscriptionMachine`] together with every
//! resource its effects refer to: the push connection being opened or read,
//! one deadline per timer concern (backoff, debounce, watchdog, poll) and the
//! on-demand fetch in flight. The task's `select!` loop turns whatever fires
//! first into a [`SubscriptionEvent`], feeds it to the machine and executes
//! the returned effects. Callers talk to the task through
//! [`ResilientSubscription`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::domain::push::PushFrame;
use crate::domain::stats::{DateRange, StatsSnapshot};
use crate::domain::subscription::{
    Effect, SubscriptionEvent, SubscriptionMachine, SubscriptionSettings, SubscriptionState,
    SubscriptionView,
};
use crate::ports::{PushStream, SourceError, StatsSource};

use super::RequestQueue;

/// Error returned to a `refresh()` caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Subscription has been closed")]
    Closed,
}

type RefreshReply = oneshot::Sender<Result<StatsSnapshot, RefreshError>>;

enum Command {
    SetFilter(Option<DateRange>),
    Refresh(RefreshReply),
    NetworkRestored,
    Unsubscribe(oneshot::Sender<()>),
}

/// Handle onto a running subscription.
///
/// Dropping the handle tears the subscription down: the driver task is
/// aborted, so no timer or connection callback runs afterwards.
pub struct ResilientSubscription {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<SubscriptionView>,
    task: JoinHandle<()>,
}

impl ResilientSubscription {
    /// Starts subscribing to `source` for `filter`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(
        source: Arc<dyn StatsSource>,
        queue: Arc<RequestQueue>,
        settings: SubscriptionSettings,
        filter: Option<DateRange>,
    ) -> Self {
        let machine = SubscriptionMachine::new(settings, filter);
        let (view_tx, view) = watch::channel(machine.view());
        let (commands, command_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            machine,
            source,
            queue,
            commands: command_rx,
            view: view_tx,
            opening: None,
            stream: None,
            timers: Timers::default(),
            fetch: None,
            in_flight: None,
            queued: None,
            refresh_waiters: Vec::new(),
        };
        let task = tokio::spawn(driver.run());

        Self {
            commands,
            view,
            task,
        }
    }

    /// Changes the filter; bursts of changes are debounced.
    pub fn set_filter(&self, filter: Option<DateRange>) {
        self.send(Command::SetFilter(filter));
    }

    /// Fetches a fresh snapshot on demand.
    ///
    /// Calls made while a fetch for the same filter is pending share its
    /// result instead of issuing another request.
    pub async fn refresh(&self) -> Result<StatsSnapshot, RefreshError> {
        let (reply, rx) = oneshot::channel();
        if !self.send(Command::Refresh(reply)) {
            return Err(RefreshError::Closed);
        }
        rx.await.unwrap_or(Err(RefreshError::Closed))
    }

    /// Signals that connectivity came back; skips any pending backoff.
    pub fn network_restored(&self) {
        self.send(Command::NetworkRestored);
    }

    pub fn state(&self) -> SubscriptionState {
        self.view.borrow().state
    }

    pub fn view(&self) -> SubscriptionView {
        self.view.borrow().clone()
    }

    /// A receiver that observes every view change.
    pub fn watch(&self) -> watch::Receiver<SubscriptionView> {
        self.view.clone()
    }

    /// Tears the subscription down and waits until the driver has stopped.
    pub async fn unsubscribe(self) {
        let (done, rx) = oneshot::channel();
        if self.send(Command::Unsubscribe(done)) {
            let _ = rx.await;
        }
    }

    fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }
}

impl Drop for ResilientSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Timers {
    backoff: Option<Instant>,
    debounce: Option<Instant>,
    watchdog: Option<Instant>,
    poll: Option<Instant>,
}

struct ActiveStream {
    generation: u64,
    frames: PushStream,
}

struct PendingFetch {
    filter: Option<DateRange>,
    waiters: Vec<RefreshReply>,
}

type OpenFuture = BoxFuture<'static, (u64, Result<PushStream, SourceError>)>;
type FetchFuture = BoxFuture<'static, Result<StatsSnapshot, SourceError>>;

/// What woke the driver loop.
enum Wake {
    Command(Option<Command>),
    Opened(u64, Result<PushStream, SourceError>),
    Frame(u64, Option<Result<PushFrame, SourceError>>),
    Fetched(Result<StatsSnapshot, SourceError>),
    Backoff,
    Debounce,
    Watchdog,
    Poll,
}

struct Driver {
    machine: SubscriptionMachine,
    source: Arc<dyn StatsSource>,
    queue: Arc<RequestQueue>,
    commands: mpsc::UnboundedReceiver<Command>,
    view: watch::Sender<SubscriptionView>,
    opening: Option<OpenFuture>,
    stream: Option<ActiveStream>,
    timers: Timers,
    fetch: Option<FetchFuture>,
    in_flight: Option<PendingFetch>,
    queued: Option<PendingFetch>,
    refresh_waiters: Vec<RefreshReply>,
}

impl Driver {
    async fn run(mut self) {
        self.dispatch(SubscriptionEvent::Subscribe);

        loop {
            let timers = self.timers;
            let wake = tokio::select! {
                biased;
                command = self.commands.recv() => Wake::Command(command),
                (generation, result) = complete(&mut self.opening) => Wake::Opened(generation, result),
                (generation, frame) = next_frame(&mut self.stream) => Wake::Frame(generation, frame),
                result = complete(&mut self.fetch) => Wake::Fetched(result),
                _ = wait_until(timers.backoff) => Wake::Backoff,
                _ = wait_until(timers.debounce) => Wake::Debounce,
                _ = wait_until(timers.watchdog) => Wake::Watchdog,
                _ = wait_until(timers.poll) => Wake::Poll,
            };

            match wake {
                Wake::Command(Some(Command::Unsubscribe(done))) => {
                    self.dispatch(SubscriptionEvent::Unsubscribe);
                    let _ = done.send(());
                    break;
                }
                Wake::Command(None) => {
                    self.dispatch(SubscriptionEvent::Unsubscribe);
                    break;
                }
                Wake::Command(Some(command)) => self.on_command(command),
                Wake::Opened(generation, result) => self.on_opened(generation, result),
                Wake::Frame(generation, frame) => self.on_frame(generation, frame),
                Wake::Fetched(result) => self.on_fetched(result),
                Wake::Backoff => {
                    self.timers.backoff = None;
                    self.dispatch(SubscriptionEvent::BackoffElapsed);
                }
                Wake::Debounce => {
                    self.timers.debounce = None;
                    self.dispatch(SubscriptionEvent::DebounceElapsed);
                }
                Wake::Watchdog => {
                    self.timers.watchdog = None;
                    self.dispatch(SubscriptionEvent::WatchdogElapsed);
                }
                Wake::Poll => {
                    self.timers.poll = None;
                    self.dispatch(SubscriptionEvent::PollElapsed);
                }
            }
        }

        tracing::debug!("Subscription driver stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::SetFilter(filter) => self.dispatch(SubscriptionEvent::FilterChanged(filter)),
            Command::Refresh(reply) => {
                self.refresh_waiters.push(reply);
                self.dispatch(SubscriptionEvent::RefreshRequested);
            }
            Command::NetworkRestored => self.dispatch(SubscriptionEvent::NetworkRestored),
            Command::Unsubscribe(_) => {}
        }
    }

    fn on_opened(&mut self, generation: u64, result: Result<PushStream, SourceError>) {
        if generation != self.machine.generation() {
            return;
        }
        match result {
            Ok(frames) => self.stream = Some(ActiveStream { generation, frames }),
            Err(SourceError::Unsupported) => {
                self.dispatch(SubscriptionEvent::PushUnsupported { generation })
            }
            Err(err) => self.dispatch(SubscriptionEvent::ConnectionLost {
                generation,
                reason: err.to_string(),
            }),
        }
    }

    fn on_frame(&mut self, generation: u64, frame: Option<Result<PushFrame, SourceError>>) {
        let event = match frame {
            Some(Ok(PushFrame::Connected(payload))) => {
                tracing::debug!(client_id = %payload.client_id, "Push connection acknowledged");
                SubscriptionEvent::Acknowledged { generation }
            }
            Some(Ok(PushFrame::StatsUpdate(snapshot))) => SubscriptionEvent::SnapshotReceived {
                generation,
                snapshot,
            },
            Some(Err(err)) => {
                self.stream = None;
                SubscriptionEvent::ConnectionLost {
                    generation,
                    reason: err.to_string(),
                }
            }
            None => {
                self.stream = None;
                SubscriptionEvent::ConnectionLost {
                    generation,
                    reason: "stream closed by server".to_string(),
                }
            }
        };
        self.dispatch(event);
    }

    fn on_fetched(&mut self, result: Result<StatsSnapshot, SourceError>) {
        let waiters = self
            .in_flight
            .take()
            .map(|pending| pending.waiters)
            .unwrap_or_default();
        let reply = result.clone().map_err(RefreshError::from);
        for waiter in waiters {
            let _ = waiter.send(reply.clone());
        }

        match result {
            Ok(snapshot) => self.dispatch(SubscriptionEvent::RefreshSucceeded(snapshot)),
            Err(err) => {
                tracing::warn!(error = %err, "On-demand refresh failed");
                self.dispatch(SubscriptionEvent::RefreshFailed {
                    reason: err.to_string(),
                });
            }
        }

        if self.fetch.is_none() {
            if let Some(next) = self.queued.take() {
                self.launch_fetch(next);
            }
        }
    }

    /// Feeds one event to the machine, executes its effects and publishes
    /// the resulting view.
    fn dispatch(&mut self, event: SubscriptionEvent) {
        let before = self.machine.state();
        let effects = self.machine.handle(event);
        for effect in effects {
            self.execute(effect);
        }

        let after = self.machine.state();
        if before != after {
            tracing::info!(from = ?before, to = ?after, "Subscription state changed");
        }

        let view = self.machine.view();
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    fn execute(&mut self, effect: Effect) {
        let now = Instant::now();
        match effect {
            Effect::OpenConnection { generation, filter } => {
                self.stream = None;
                let source = self.source.clone();
                self.opening = Some(Box::pin(async move {
                    (generation, source.open_stream(filter.as_ref()).await)
                }));
                tracing::debug!(generation, filtered = filter.is_some(), "Opening push connection");
            }
            Effect::CloseConnection => {
                self.opening = None;
                self.stream = None;
            }
            Effect::ScheduleBackoff(delay) => self.timers.backoff = Some(now + delay),
            Effect::CancelBackoff => self.timers.backoff = None,
            Effect::ScheduleDebounce(delay) => self.timers.debounce = Some(now + delay),
            Effect::CancelDebounce => self.timers.debounce = None,
            Effect::ArmWatchdog(delay) => self.timers.watchdog = Some(now + delay),
            Effect::DisarmWatchdog => self.timers.watchdog = None,
            Effect::SchedulePoll(delay) => self.timers.poll = Some(now + delay),
            Effect::CancelPoll => self.timers.poll = None,
            Effect::FetchSnapshot { filter } => {
                let waiters = std::mem::take(&mut self.refresh_waiters);
                self.request_fetch(filter, waiters);
            }
        }
    }

    /// Joins a pending fetch for the same filter, or queues one behind the
    /// fetch in flight. A newer queued filter supersedes an older one.
    fn request_fetch(&mut self, filter: Option<DateRange>, waiters: Vec<RefreshReply>) {
        if let Some(in_flight) = self.in_flight.as_mut() {
            if in_flight.filter == filter {
                tracing::trace!("Coalescing refresh with the request in flight");
                in_flight.waiters.extend(waiters);
                return;
            }
            match self.queued.as_mut() {
                Some(queued) => {
                    queued.filter = filter;
                    queued.waiters.extend(waiters);
                }
                None => self.queued = Some(PendingFetch { filter, waiters }),
            }
            return;
        }
        self.launch_fetch(PendingFetch { filter, waiters });
    }

    fn launch_fetch(&mut self, pending: PendingFetch) {
        let source = self.source.clone();
        let queue = self.queue.clone();
        let filter = pending.filter;
        self.fetch = Some(Box::pin(async move {
            queue
                .enqueue(move || async move { source.fetch_snapshot(filter.as_ref()).await })
                .await
        }));
        self.in_flight = Some(pending);
    }
}

/// Drives an optional future to completion, clearing the slot afterwards.
/// Never resolves while the slot is empty.
async fn complete<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    let output = match slot.as_mut() {
        Some(fut) => fut.await,
        None => future::pending().await,
    };
    *slot = None;
    output
}

async fn next_frame(stream: &mut Option<ActiveStream>) -> (u64, Option<Result<PushFrame, SourceError>>) {
    match stream.as_mut() {
        Some(active) => (active.generation, active.frames.next().await),
        None => future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Convenience for callers that configure spacing and settings separately.
pub fn subscribe_with_spacing(
    source: Arc<dyn StatsSource>,
    min_spacing: Duration,
    settings: SubscriptionSettings,
    filter: Option<DateRange>,
) -> ResilientSubscription {
    ResilientSubscription::subscribe(
        source,
        Arc::new(RequestQueue::new(min_spacing)),
        settings,
        filter,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{OpenOutcome, ScriptedStatsSource};
    use crate::domain::foundation::Timestamp;
    use crate::domain::stats::DashboardStats;

    fn settings() -> SubscriptionSettings {
        SubscriptionSettings::default()
    }

    fn start(source: &Arc<ScriptedStatsSource>, settings: SubscriptionSettings) -> ResilientSubscription {
        subscribe_with_spacing(source.clone(), Duration::from_secs(1), settings, None)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledged_connection_becomes_connected() {
        let source = Arc::new(ScriptedStatsSource::new());
        let subscription = start(&source, settings());

        settle().await;

        assert_eq!(subscription.state(), SubscriptionState::Connected);
        assert_eq!(source.opens(), vec![None]);
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_snapshot_reaches_view() {
        let source = Arc::new(ScriptedStatsSource::new());
        let subscription = start(&source, settings());
        settle().await;

        let snapshot = StatsSnapshot::new(
            DashboardStats {
                total_events: 42,
                ..Default::default()
            },
            None,
            Timestamp::now(),
        );
        source.push_snapshot(snapshot);
        settle().await;

        let view = subscription.view();
        assert_eq!(view.stats.map(|s| s.stats.total_events), Some(42));
        assert!(!view.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_push_falls_back_to_polling() {
        let source = Arc::new(ScriptedStatsSource::with_default(OpenOutcome::Refuse(
            SourceError::Unsupported,
        )));
        let subscription = start(&source, settings());
        settle().await;

        assert_eq!(subscription.state(), SubscriptionState::PollingFallback);
        assert_eq!(source.fetches().len(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(source.fetches().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_stops_everything() {
        let source = Arc::new(ScriptedStatsSource::with_default(OpenOutcome::Refuse(
            SourceError::Transport("down".into()),
        )));
        let subscription = start(&source, settings());
        settle().await;
        assert_eq!(subscription.state(), SubscriptionState::Reconnecting);

        let watcher = subscription.watch();
        subscription.unsubscribe().await;
        assert_eq!(watcher.borrow().state, SubscriptionState::Disconnected);

        let opens = source.opens().len();
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(source.opens().len(), opens);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_surfaces_to_caller_only() {
        let source = Arc::new(ScriptedStatsSource::new());
        let subscription = start(&source, settings());
        settle().await;

        source.fail_fetches(1);
        let first = subscription.refresh().await;
        let second = subscription.refresh().await;

        assert!(matches!(first, Err(RefreshError::Source(SourceError::Transport(_)))));
        assert!(second.is_ok());
        assert!(!subscription.view().is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn network_restored_skips_backoff() {
        let source = Arc::new(ScriptedStatsSource::new());
        source.script_opens([OpenOutcome::Refuse(SourceError::Transport("offline".into()))]);
        let subscription = start(&source, settings());
        settle().await;
        assert_eq!(subscription.state(), SubscriptionState::Reconnecting);

        subscription.network_restored();
        settle().await;

        assert_eq!(subscription.state(), SubscriptionState::Connected);
        assert_eq!(source.opens().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_closes_connection() {
        let source = Arc::new(ScriptedStatsSource::new());
        let subscription = start(&source, settings());
        settle().await;
        assert_eq!(source.live_connections(), 1);

        drop(subscription);
        settle().await;

        assert_eq!(source.live_connections(), 0);
    }
}
