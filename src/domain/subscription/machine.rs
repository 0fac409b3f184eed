//! Sans-IO subscription machine.
//!
//! The machine owns every decision a dashboard subscription makes: when to
//! open or abandon a push connection, how long to back off, which snapshots
//! to accept, and when to fall back to on-demand requests. It performs no IO
//! and reads no clock except to stamp `last_update`. A driver feeds it
//! [`SubscriptionEvent`]s and executes the [`Effect`]s it returns.
//!
//! Each push connection is tagged with a generation number. Frames and
//! errors carrying an older generation come from an abandoned connection and
//! are ignored.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::domain::foundation::{StateMachine, Timestamp};
use crate::domain::stats::{DateRange, StatsSnapshot};

use super::{ReconnectPolicy, SubscriptionState};

/// Errors a subscription surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionError {
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("Could not reach the statistics server after {attempts} attempts; reload to try again")]
    ReconnectExhausted { attempts: u32 },

    #[error("Refresh failed: {reason}")]
    RefreshFailed { reason: String },
}

impl SubscriptionError {
    /// True if automatic recovery has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReconnectExhausted { .. })
    }
}

/// Timings and switches the machine runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionSettings {
    pub push_enabled: bool,
    pub reconnect: ReconnectPolicy,
    pub debounce: Duration,
    pub watchdog: Duration,
    pub poll_interval: Duration,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            push_enabled: true,
            reconnect: ReconnectPolicy::default(),
            debounce: Duration::from_millis(300),
            watchdog: Duration::from_secs(10),
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Inputs to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Subscribe,
    /// The server acknowledged connection `generation`.
    Acknowledged { generation: u64 },
    SnapshotReceived { generation: u64, snapshot: StatsSnapshot },
    ConnectionLost { generation: u64, reason: String },
    /// The server answered connection `generation` without a stream.
    PushUnsupported { generation: u64 },
    BackoffElapsed,
    FilterChanged(Option<DateRange>),
    DebounceElapsed,
    WatchdogElapsed,
    PollElapsed,
    RefreshRequested,
    RefreshSucceeded(StatsSnapshot),
    RefreshFailed { reason: String },
    NetworkRestored,
    Unsubscribe,
}

/// Work the driver must carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenConnection {
        generation: u64,
        filter: Option<DateRange>,
    },
    CloseConnection,
    ScheduleBackoff(Duration),
    CancelBackoff,
    ScheduleDebounce(Duration),
    CancelDebounce,
    ArmWatchdog(Duration),
    DisarmWatchdog,
    SchedulePoll(Duration),
    CancelPoll,
    FetchSnapshot {
        filter: Option<DateRange>,
    },
}

/// What a caller sees of a subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub state: SubscriptionState,
    pub stats: Option<StatsSnapshot>,
    pub is_loading: bool,
    pub error: Option<SubscriptionError>,
    pub last_update: Option<Timestamp>,
    pub reconnect_attempts: u32,
    pub filter: Option<DateRange>,
}

impl Default for SubscriptionView {
    fn default() -> Self {
        Self {
            state: SubscriptionState::Disconnected,
            stats: None,
            is_loading: false,
            error: None,
            last_update: None,
            reconnect_attempts: 0,
            filter: None,
        }
    }
}

/// The subscription decision core.
#[derive(Debug, Clone)]
pub struct SubscriptionMachine {
    settings: SubscriptionSettings,
    state: SubscriptionState,
    attempt: u32,
    generation: u64,
    filter: Option<DateRange>,
    pending_filter: Option<Option<DateRange>>,
    stats: Option<StatsSnapshot>,
    last_applied: Option<Timestamp>,
    last_update: Option<Timestamp>,
    loading: bool,
    error: Option<SubscriptionError>,
}

impl SubscriptionMachine {
    pub fn new(settings: SubscriptionSettings, filter: Option<DateRange>) -> Self {
        Self {
            settings,
            state: SubscriptionState::Disconnected,
            attempt: 0,
            generation: 0,
            filter,
            pending_filter: None,
            stats: None,
            last_applied: None,
            last_update: None,
            loading: false,
            error: None,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn filter(&self) -> Option<&DateRange> {
        self.filter.as_ref()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn view(&self) -> SubscriptionView {
        SubscriptionView {
            state: self.state,
            stats: self.stats.clone(),
            is_loading: self.loading,
            error: self.error.clone(),
            last_update: self.last_update,
            reconnect_attempts: self.attempt,
            filter: self.filter,
        }
    }

    /// Applies one event and returns the effects to execute, in order.
    pub fn handle(&mut self, event: SubscriptionEvent) -> Vec<Effect> {
        use SubscriptionEvent as E;

        let mut effects = Vec::new();
        match event {
            E::Subscribe => self.on_subscribe(&mut effects),
            E::Acknowledged { generation } => {
                if self.is_current(generation) && self.state == SubscriptionState::Connecting {
                    self.mark_connected();
                }
            }
            E::SnapshotReceived {
                generation,
                snapshot,
            } => {
                if self.is_current(generation) && self.state.is_push_active() {
                    if self.state == SubscriptionState::Connecting {
                        self.mark_connected();
                    }
                    if self.apply(snapshot) {
                        effects.push(Effect::DisarmWatchdog);
                    }
                }
            }
            E::ConnectionLost { generation, reason } => {
                if self.is_current(generation) && self.state.is_push_active() {
                    self.on_connection_lost(reason, &mut effects);
                }
            }
            E::PushUnsupported { generation } => {
                if self.is_current(generation) && self.state.is_push_active() {
                    self.enter_polling(&mut effects);
                }
            }
            E::BackoffElapsed => {
                if self.state == SubscriptionState::Reconnecting {
                    self.begin_connect(&mut effects);
                }
            }
            E::FilterChanged(filter) => self.on_filter_changed(filter, &mut effects),
            E::DebounceElapsed => self.on_debounce_elapsed(&mut effects),
            E::WatchdogElapsed => {
                if self.loading && self.state.is_push_active() {
                    tracing::warn!(
                        state = ?self.state,
                        "No statistics arrived before the watchdog expired; clearing loading flag"
                    );
                    self.loading = false;
                }
            }
            E::PollElapsed => {
                if self.state == SubscriptionState::PollingFallback {
                    effects.push(Effect::FetchSnapshot {
                        filter: self.filter,
                    });
                    effects.push(Effect::SchedulePoll(self.settings.poll_interval));
                }
            }
            E::RefreshRequested => {
                self.loading = true;
                effects.push(Effect::FetchSnapshot {
                    filter: self.filter,
                });
            }
            E::RefreshSucceeded(snapshot) => {
                self.apply(snapshot);
                self.loading = false;
                if self.state == SubscriptionState::Failed {
                    tracing::info!("Manual refresh succeeded; retrying push connection");
                    self.attempt = 0;
                    self.error = None;
                    self.begin_connect(&mut effects);
                }
            }
            E::RefreshFailed { reason } => {
                self.loading = false;
                if !matches!(self.error, Some(SubscriptionError::ReconnectExhausted { .. })) {
                    self.error = Some(SubscriptionError::RefreshFailed { reason });
                }
            }
            E::NetworkRestored => {
                if matches!(
                    self.state,
                    SubscriptionState::Reconnecting | SubscriptionState::Failed
                ) {
                    tracing::info!(state = ?self.state, "Network restored; reconnecting now");
                    self.attempt = 0;
                    self.error = None;
                    effects.push(Effect::CancelBackoff);
                    self.begin_connect(&mut effects);
                }
            }
            E::Unsubscribe => self.on_unsubscribe(&mut effects),
        }
        effects
    }

    fn on_subscribe(&mut self, effects: &mut Vec<Effect>) {
        if self.state != SubscriptionState::Disconnected {
            return;
        }
        self.loading = true;
        self.error = None;
        if self.settings.push_enabled {
            self.begin_connect(effects);
        } else {
            self.enter_polling(effects);
        }
    }

    fn on_connection_lost(&mut self, reason: String, effects: &mut Vec<Effect>) {
        effects.push(Effect::CloseConnection);
        effects.push(Effect::DisarmWatchdog);
        self.loading = false;
        self.attempt += 1;

        let policy = self.settings.reconnect;
        if policy.allows(self.attempt) {
            let delay = policy.delay_for(self.attempt);
            tracing::info!(
                attempt = self.attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                %reason,
                "Push connection lost; scheduling reconnect"
            );
            self.enter(SubscriptionState::Reconnecting);
            self.error = Some(SubscriptionError::ConnectionLost { reason });
            effects.push(Effect::ScheduleBackoff(delay));
        } else {
            tracing::warn!(
                attempts = policy.max_attempts,
                %reason,
                "Reconnect attempts exhausted; giving up on push"
            );
            self.enter(SubscriptionState::Failed);
            self.error = Some(SubscriptionError::ReconnectExhausted {
                attempts: policy.max_attempts,
            });
        }
    }

    fn on_filter_changed(&mut self, filter: Option<DateRange>, effects: &mut Vec<Effect>) {
        if self.state == SubscriptionState::Disconnected {
            self.filter = filter;
            return;
        }
        self.pending_filter = Some(filter);
        effects.push(Effect::ScheduleDebounce(self.settings.debounce));
    }

    fn on_debounce_elapsed(&mut self, effects: &mut Vec<Effect>) {
        let Some(next) = self.pending_filter.take() else {
            return;
        };
        if next == self.filter {
            return;
        }
        tracing::debug!(filter = ?next, "Applying debounced filter change");
        self.filter = next;

        match self.state {
            SubscriptionState::Connecting
            | SubscriptionState::Connected
            | SubscriptionState::Reconnecting => {
                self.attempt = 0;
                self.error = None;
                self.loading = true;
                effects.push(Effect::CloseConnection);
                effects.push(Effect::CancelBackoff);
                self.begin_connect(effects);
            }
            SubscriptionState::PollingFallback | SubscriptionState::Failed => {
                self.loading = true;
                effects.push(Effect::FetchSnapshot {
                    filter: self.filter,
                });
            }
            SubscriptionState::Disconnected => {}
        }
    }

    fn on_unsubscribe(&mut self, effects: &mut Vec<Effect>) {
        if self.state == SubscriptionState::Disconnected {
            return;
        }
        self.enter(SubscriptionState::Disconnected);
        self.generation += 1;
        self.loading = false;
        self.pending_filter = None;
        effects.extend([
            Effect::CloseConnection,
            Effect::CancelBackoff,
            Effect::CancelDebounce,
            Effect::DisarmWatchdog,
            Effect::CancelPoll,
        ]);
    }

    fn begin_connect(&mut self, effects: &mut Vec<Effect>) {
        self.generation += 1;
        self.enter(SubscriptionState::Connecting);
        effects.push(Effect::OpenConnection {
            generation: self.generation,
            filter: self.filter,
        });
        effects.push(Effect::ArmWatchdog(self.settings.watchdog));
    }

    fn enter_polling(&mut self, effects: &mut Vec<Effect>) {
        tracing::info!("Push unavailable; polling for statistics");
        self.enter(SubscriptionState::PollingFallback);
        self.loading = true;
        effects.extend([
            Effect::CloseConnection,
            Effect::DisarmWatchdog,
            Effect::CancelBackoff,
            Effect::FetchSnapshot {
                filter: self.filter,
            },
            Effect::SchedulePoll(self.settings.poll_interval),
        ]);
    }

    fn mark_connected(&mut self) {
        self.enter(SubscriptionState::Connected);
        self.attempt = 0;
        self.error = None;
    }

    /// Applies a snapshot unless it is for another filter or older than the
    /// one on display.
    fn apply(&mut self, snapshot: StatsSnapshot) -> bool {
        if !snapshot.matches_filter(self.filter.as_ref()) {
            tracing::debug!(
                snapshot_filter = ?snapshot.date_filter,
                "Discarding snapshot computed for another filter"
            );
            return false;
        }
        if snapshot.is_older_than(self.last_applied) {
            tracing::debug!(
                generated_at = %snapshot.generated_at,
                "Discarding snapshot older than the one on display"
            );
            return false;
        }
        self.last_applied = Some(snapshot.generated_at);
        self.last_update = Some(Timestamp::now());
        self.stats = Some(snapshot);
        self.loading = false;
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    fn enter(&mut self, next: SubscriptionState) {
        if let Err(err) = self.state.transition_to(next) {
            tracing::warn!(error = %err, "Unexpected subscription transition");
        }
        self.state = next;
    }
}
