//! Bridge from the change bus to the broadcast manager.
//!
//! ```text
//! mutation ─▶ ChangePublisher::publish ─▶ BroadcastTrigger::on_change
//!                                                  │ trigger_immediate_update
//!                                                  ▼
//!                                        coalescer task (manager)
//! ```
//!
//! The trigger holds a weak reference, so the bus cannot keep a dropped
//! manager alive.

use std::sync::Weak;

use crate::ports::ChangeListener;

use super::manager::BroadcastManager;

/// Change listener that requests a broadcast from the manager.
pub struct BroadcastTrigger {
    manager: Weak<BroadcastManager>,
}

impl BroadcastTrigger {
    pub fn new(manager: Weak<BroadcastManager>) -> Self {
        Self { manager }
    }
}

impl ChangeListener for BroadcastTrigger {
    fn on_change(&self) {
        match self.manager.upgrade() {
            Some(manager) => manager.trigger_immediate_update(),
            None => tracing::trace!("Broadcast manager dropped; ignoring change"),
        }
    }

    fn name(&self) -> &'static str {
        "BroadcastTrigger"
    }
}
