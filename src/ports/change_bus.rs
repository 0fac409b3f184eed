//! Change bus ports - A payload-free "state may have changed" signal.
//!
//! Any mutation in the system publishes; any number of listeners subscribe
//! independently. The bus is a dumb multiplexer: it neither coalesces nor
//! buffers. Listeners that do expensive work on a signal (the broadcast
//! manager) coalesce bursts themselves.

use std::fmt;
use std::sync::Arc;

/// Receives change signals.
///
/// `on_change` runs synchronously inside `publish`, so implementations must
/// return quickly and must not block; schedule real work elsewhere.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self);

    /// Listener name for logging.
    fn name(&self) -> &'static str;
}

/// Adapts a closure into a [`ChangeListener`].
pub struct FnListener<F> {
    name: &'static str,
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn() + Send + Sync + 'static,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }

    pub fn arc(name: &'static str, f: F) -> Arc<dyn ChangeListener> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> ChangeListener for FnListener<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn on_change(&self) {
        (self.f)()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Port for announcing a change.
pub trait ChangePublisher: Send + Sync {
    /// Announces that state may have changed.
    ///
    /// Synchronous, never blocks, never fails. A panicking listener does not
    /// prevent delivery to the others.
    fn publish(&self);
}

/// Port for registering change listeners.
pub trait ChangeSubscriber: Send + Sync {
    /// Registers `listener`; it stays registered until the returned
    /// subscription is unsubscribed or dropped.
    fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> ChangeSubscription;
}

/// Combined trait for change bus implementations.
pub trait ChangeBus: ChangePublisher + ChangeSubscriber {}

impl<T: ChangePublisher + ChangeSubscriber> ChangeBus for T {}

/// Registration handle returned by [`ChangeSubscriber::subscribe`].
///
/// Unsubscribes when dropped. Unsubscribing twice is impossible by
/// construction; the canceller runs at most once.
#[must_use = "dropping a ChangeSubscription unsubscribes immediately"]
pub struct ChangeSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ChangeSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
