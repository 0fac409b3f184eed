//! In-memory change bus.
//!
//! The process-wide implementation of the change signal. Delivery is
//! synchronous: `publish` invokes every listener on the caller's thread and
//! returns. Listeners must therefore be cheap (the broadcast manager's only
//! wakes a coalescing task).

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::ports::{ChangeListener, ChangePublisher, ChangeSubscriber, ChangeSubscription};

type ListenerMap = BTreeMap<u64, Arc<dyn ChangeListener>>;

/// In-memory change bus.
///
/// Features:
/// - Any number of independent listeners
/// - Unsubscribe through the returned [`ChangeSubscription`]
/// - Publish counter for assertions
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryChangeBus::new());
/// let sub = bus.subscribe(FnListener::arc("log", || tracing::info!("changed")));
///
/// bus.publish();
/// assert_eq!(bus.publish_count(), 1);
///
/// sub.unsubscribe();
/// ```
#[derive(Clone, Default)]
pub struct InMemoryChangeBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    listeners: RwLock<ListenerMap>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl InMemoryChangeBus {
    /// Creates a new bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    // === Introspection ===

    /// Number of signals published so far.
    pub fn publish_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ChangePublisher for InMemoryChangeBus {
    fn publish(&self) {
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        // Clone listeners to release the lock before invoking them
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        tracing::trace!(listeners = listeners.len(), "Publishing change signal");

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_change())).is_err() {
                tracing::error!(listener = listener.name(), "Change listener panicked");
            }
        }
    }
}

impl ChangeSubscriber for InMemoryChangeBus {
    fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> ChangeSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = listener.name();
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        tracing::debug!(listener = name, "Change listener subscribed");

        let inner = Arc::downgrade(&self.inner);
        ChangeSubscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .listeners
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                tracing::debug!(listener = name, "Change listener unsubscribed");
            }
        })
    }
}
