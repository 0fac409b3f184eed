//! Subscription domain - the client-side lifecycle of a live dashboard feed.
//!
//! Everything here is pure: states, backoff arithmetic and the decision
//! machine. The async driver lives in `application::subscription`.

mod backoff;
mod machine;
mod state;

pub use backoff::ReconnectPolicy;
pub use machine::{
    Effect, SubscriptionError, SubscriptionEvent, SubscriptionMachine, SubscriptionSettings,
    SubscriptionView,
};
pub use state::SubscriptionState;
