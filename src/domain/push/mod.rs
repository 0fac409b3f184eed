//! Push wire messages shared by the broadcasting server and subscribing
//! clients.

mod message;

pub use message::{ConnectedPayload, PushEvent, PushFrame, PushMessage};
