//! Broadcast manager: client registry and snapshot fan-out.
//!
//! # Architecture
//!
//! ```text
//!  change signal ─▶ Notify ─▶ coalescer ─┐
//!              (quiet window, capped by max wait)
//!                                        ▼
//!  periodic ticker ─────────────▶ run_broadcast_cycle ─▶ provider ─▶ broadcast
//!                                  (one at a time,               │
//!                                   rerun once if busy)          ▼
//!                                                     client A, client B, ...
//! ```
//!
//! Clients are grouped by the filter their connection was opened with; a
//! cycle computes one snapshot per distinct filter. Unfiltered dashboards
//! (the common case) all share a single snapshot.
//!
//! # Thread Safety
//!
//! The registry sits behind a `std::sync::RwLock` held only for map
//! operations, never across an `.await`. A cycle works from one cloned list
//! of entries: clients connecting mid-cycle wait for the next cycle, and
//! clients removed mid-cycle are skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::domain::foundation::{ClientId, Timestamp};
use crate::domain::push::{ConnectedPayload, PushMessage};
use crate::domain::stats::{DateRange, StatsSnapshot};
use crate::ports::{
    ChangeSubscriber, ChangeSubscription, PushTransport, SnapshotProvider, TransportError,
};

use super::trigger::BroadcastTrigger;

/// Timing knobs for the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Interval of the periodic broadcast.
    pub periodic_interval: Duration,
    /// Quiet period after the last change signal before broadcasting.
    pub coalesce_window: Duration,
    /// Upper bound on how long a burst can postpone its broadcast, counted
    /// from the first signal of the burst.
    pub coalesce_max_wait: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            periodic_interval: Duration::from_secs(30),
            coalesce_window: Duration::from_millis(250),
            coalesce_max_wait: Duration::from_secs(1),
        }
    }
}

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Clients that already had a newer snapshot.
    pub skipped: usize,
    /// Clients removed because the write failed.
    pub failed: usize,
}

/// One registered push connection.
struct ClientEntry {
    id: ClientId,
    transport: Arc<dyn PushTransport>,
    filter: Option<DateRange>,
    registered_at: Timestamp,
    last_sent: Mutex<Option<Timestamp>>,
}

impl ClientEntry {
    /// Claims `snapshot` for delivery unless an equal-or-newer one was
    /// already sent.
    fn claim(&self, snapshot: &StatsSnapshot) -> bool {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshot.is_older_than(*last_sent) {
            return false;
        }
        *last_sent = Some(snapshot.generated_at);
        true
    }
}

#[derive(Default)]
struct Background {
    periodic: Option<JoinHandle<()>>,
    coalescer: Option<JoinHandle<()>>,
    change_subscription: Option<ChangeSubscription>,
}

/// Owns the client registry and decides when to compute and push snapshots.
///
/// Lifecycle: construct, [`start`](Self::start), serve, then
/// [`shutdown`](Self::shutdown). The manager is injected into request
/// handlers as `Arc<BroadcastManager>`.
///
/// # Example
///
/// ```ignore
/// let manager = Arc::new(BroadcastManager::new(provider, BroadcastSettings::default()));
/// manager.start(&change_bus);
///
/// let id = manager.register_client(transport, None).await?;
/// // ... mutations publish on the change bus, clients receive snapshots ...
/// manager.shutdown().await;
/// ```
pub struct BroadcastManager {
    provider: Arc<dyn SnapshotProvider>,
    settings: BroadcastSettings,
    clients: RwLock<HashMap<ClientId, Arc<ClientEntry>>>,
    next_message_id: AtomicU64,
    wake: Arc<Notify>,
    cycle_gate: tokio::sync::Mutex<()>,
    rerun: AtomicBool,
    background: Mutex<Background>,
    running: AtomicBool,
    shut_down: AtomicBool,
}

impl BroadcastManager {
    pub fn new(provider: Arc<dyn SnapshotProvider>, settings: BroadcastSettings) -> Self {
        Self {
            provider,
            settings,
            clients: RwLock::new(HashMap::new()),
            next_message_id: AtomicU64::new(1),
            wake: Arc::new(Notify::new()),
            cycle_gate: tokio::sync::Mutex::new(()),
            rerun: AtomicBool::new(false),
            background: Mutex::new(Background::default()),
            running: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> BroadcastSettings {
        self.settings
    }

    // === Lifecycle ===

    /// Subscribes to `changes` and starts the coalescer and periodic ticker.
    ///
    /// Calling `start` again re-arms the periodic timer without duplicating
    /// the change subscription. A manager that has been shut down stays down.
    pub fn start(self: &Arc<Self>, changes: &dyn ChangeSubscriber) {
        if self.shut_down.load(Ordering::SeqCst) {
            tracing::warn!("Broadcast manager was shut down; ignoring start");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        {
            let mut background = self.lock_background();
            if background.change_subscription.is_none() {
                let trigger = Arc::new(BroadcastTrigger::new(Arc::downgrade(self)));
                background.change_subscription = Some(changes.subscribe(trigger));
            }
            if background.coalescer.is_none() {
                background.coalescer = Some(self.spawn_coalescer());
            }
        }

        self.start_periodic_broadcast(self.settings.periodic_interval);
        tracing::info!(
            interval_ms = self.settings.periodic_interval.as_millis() as u64,
            coalesce_window_ms = self.settings.coalesce_window.as_millis() as u64,
            coalesce_max_wait_ms = self.settings.coalesce_max_wait.as_millis() as u64,
            "Broadcast manager started"
        );
    }

    /// Arms the periodic broadcast, replacing any timer already running.
    ///
    /// Ticks with no registered clients do nothing.
    pub fn start_periodic_broadcast(self: &Arc<Self>, interval: Duration) {
        if interval.is_zero() {
            tracing::warn!("Periodic broadcast interval is zero; timer not armed");
            return;
        }
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }

        let manager = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if manager.client_count() == 0 {
                    tracing::trace!("No clients connected; skipping periodic broadcast");
                    continue;
                }
                manager.run_broadcast_cycle().await;
            }
        });

        if let Some(previous) = self.lock_background().periodic.replace(handle) {
            previous.abort();
            tracing::debug!("Replaced existing periodic broadcast timer");
        }
    }

    /// Stops every timer, closes every client transport and empties the
    /// registry. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);

        let background = std::mem::take(&mut *self.lock_background());
        if let Some(handle) = background.periodic {
            handle.abort();
        }
        if let Some(handle) = background.coalescer {
            handle.abort();
        }
        if let Some(subscription) = background.change_subscription {
            subscription.unsubscribe();
        }

        let entries: Vec<Arc<ClientEntry>> = self
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        let closed = entries.len();
        join_all(entries.iter().map(|entry| entry.transport.close())).await;

        tracing::info!(closed_clients = closed, "Broadcast manager shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // === Registry ===

    /// Registers a push connection opened with `filter`.
    ///
    /// The `connected` acknowledgement is written to this client only, and
    /// before the client becomes visible to broadcasts, so it is always the
    /// first message on the stream. Fails if the acknowledgement cannot be
    /// written or the manager has shut down.
    pub async fn register_client(
        &self,
        transport: Arc<dyn PushTransport>,
        filter: Option<DateRange>,
    ) -> Result<ClientId, TransportError> {
        if self.shut_down.load(Ordering::SeqCst) {
            transport.close().await;
            return Err(TransportError::Closed);
        }

        let id = ClientId::new();
        let registered_at = Timestamp::now();
        let payload = ConnectedPayload::new(id, registered_at);
        let ack = match PushMessage::connected(self.next_id(), &payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(client_id = %id, error = %err, "Failed to encode connected message");
                transport.close().await;
                return Err(TransportError::Closed);
            }
        };

        if let Err(err) = transport.send(ack).await {
            tracing::debug!(client_id = %id, error = %err, "Client went away before acknowledgement");
            transport.close().await;
            return Err(err);
        }

        let entry = Arc::new(ClientEntry {
            id,
            transport,
            filter,
            registered_at,
            last_sent: Mutex::new(None),
        });
        let client_count = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            clients.insert(id, entry);
            clients.len()
        };

        tracing::info!(client_id = %id, filter = ?filter, client_count, "Client registered");
        Ok(id)
    }

    /// Removes a client. Returns false if it was not registered.
    pub fn deregister_client(&self, id: &ClientId) -> bool {
        let (removed, client_count) = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            let removed = clients.remove(id);
            (removed, clients.len())
        };

        match removed {
            Some(entry) => {
                let connected_secs = Timestamp::now()
                    .duration_since(&entry.registered_at)
                    .num_seconds();
                tracing::info!(client_id = %id, client_count, connected_secs, "Client deregistered");
                true
            }
            None => false,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_registered(&self, id: &ClientId) -> bool {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    // === Broadcasting ===

    /// Requests a broadcast soon.
    ///
    /// Cheap and non-blocking. Calls within one coalescing window collapse
    /// into a single cycle whose snapshot is computed after the last call.
    /// Has no effect until the manager is started.
    pub fn trigger_immediate_update(&self) {
        if !self.is_running() {
            tracing::debug!("Broadcast manager not running; ignoring trigger");
            return;
        }
        self.wake.notify_one();
    }

    /// Sends one snapshot computed for the client's own filter to a newly
    /// registered client.
    pub async fn send_initial_snapshot(&self, id: ClientId) {
        let Some(entry) = self.entry(&id) else {
            return;
        };

        let snapshot = match self.provider.compute_snapshot(entry.filter).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(client_id = %id, error = %err, "Initial snapshot failed; client waits for next broadcast");
                return;
            }
        };

        let message = match PushMessage::stats_update(self.next_id(), &snapshot) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode stats update");
                return;
            }
        };

        if !entry.claim(&snapshot) {
            tracing::debug!(client_id = %id, "Client already has a newer snapshot");
            return;
        }
        if let Err(err) = entry.transport.send(message).await {
            self.drop_failed(&entry, &err).await;
        }
    }

    /// Writes `snapshot` to every client whose connection filter matches
    /// the snapshot's filter.
    ///
    /// A failed write removes that client and delivery continues with the
    /// rest. Clients that were already sent a newer snapshot are skipped.
    pub async fn broadcast(&self, snapshot: &StatsSnapshot) -> BroadcastReport {
        let clients = self.registry_snapshot();
        self.fan_out(snapshot, &clients).await
    }

    async fn fan_out(
        &self,
        snapshot: &StatsSnapshot,
        clients: &[Arc<ClientEntry>],
    ) -> BroadcastReport {
        let targets: Vec<Arc<ClientEntry>> = clients
            .iter()
            .filter(|entry| entry.filter == snapshot.date_filter && self.is_registered(&entry.id))
            .cloned()
            .collect();

        let mut report = BroadcastReport::default();
        if targets.is_empty() {
            return report;
        }

        let message = match PushMessage::stats_update(self.next_id(), snapshot) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode stats update; nothing sent");
                return report;
            }
        };

        let claimed: Vec<Arc<ClientEntry>> = targets
            .into_iter()
            .filter(|entry| {
                let fresh = entry.claim(snapshot);
                if !fresh {
                    report.skipped += 1;
                }
                fresh
            })
            .collect();

        let results = join_all(
            claimed
                .iter()
                .map(|entry| entry.transport.send(message.clone())),
        )
        .await;

        for (entry, result) in claimed.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    self.drop_failed(entry, &err).await;
                }
            }
        }

        tracing::debug!(
            message_id = message.id,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Broadcast complete"
        );
        report
    }

    /// Computes and fans out fresh snapshots.
    ///
    /// Never runs two cycles in parallel: a call arriving while a cycle is
    /// in progress makes that cycle run once more when it finishes.
    pub async fn run_broadcast_cycle(&self) {
        self.rerun.store(true, Ordering::SeqCst);
        loop {
            let Ok(guard) = self.cycle_gate.try_lock() else {
                tracing::debug!("Broadcast in progress; it will run once more");
                return;
            };
            while self.rerun.swap(false, Ordering::SeqCst) {
                self.broadcast_cycle_once().await;
            }
            drop(guard);

            if !self.rerun.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn broadcast_cycle_once(&self) {
        let clients = self.registry_snapshot();
        if clients.is_empty() {
            tracing::trace!("No clients connected; skipping broadcast cycle");
            return;
        }

        let mut filters: Vec<Option<DateRange>> = Vec::new();
        for entry in &clients {
            if !filters.contains(&entry.filter) {
                filters.push(entry.filter);
            }
        }

        for filter in filters {
            match self.provider.compute_snapshot(filter).await {
                Ok(snapshot) => {
                    self.fan_out(&snapshot, &clients).await;
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        filter = ?filter,
                        "Snapshot computation failed; skipping broadcast"
                    );
                }
            }
        }
    }

    fn spawn_coalescer(self: &Arc<Self>) -> JoinHandle<()> {
        let wake = self.wake.clone();
        let manager: Weak<Self> = Arc::downgrade(self);
        let window = self.settings.coalesce_window;
        let max_wait = self.settings.coalesce_max_wait.max(window);

        tokio::spawn(async move {
            loop {
                wake.notified().await;
                let deadline = Instant::now() + max_wait;
                // Extend the window while signals keep arriving, up to the deadline
                loop {
                    tokio::select! {
                        biased;
                        _ = tokio::time::sleep_until(deadline) => break,
                        _ = tokio::time::sleep(window) => break,
                        _ = wake.notified() => continue,
                    }
                }

                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if manager.client_count() == 0 {
                    tracing::debug!("Change signalled but no clients connected; skipping");
                    continue;
                }
                manager.run_broadcast_cycle().await;
            }
        })
    }

    // === Helpers ===

    async fn drop_failed(&self, entry: &ClientEntry, err: &TransportError) {
        tracing::warn!(client_id = %entry.id, error = %err, "Write failed; removing client");
        self.deregister_client(&entry.id);
        entry.transport.close().await;
    }

    fn entry(&self, id: &ClientId) -> Option<Arc<ClientEntry>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn registry_snapshot(&self) -> Vec<Arc<ClientEntry>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn next_id(&self) -> u64 {
        self.next_message_id.fetch_add(1, Ordering::SeqCst)
    }

    fn lock_background(&self) -> std::sync::MutexGuard<'_, Background> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BroadcastManager {
    fn drop(&mut self) {
        let background = self.background.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = background.periodic.take() {
            handle.abort();
        }
        if let Some(handle) = background.coalescer.take() {
            handle.abort();
        }
    }
}
