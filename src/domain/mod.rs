//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors, state machines)
//! - `stats` - Dashboard statistics payload and the date filter it is computed for
//! - `push` - Wire messages exchanged over the push stream
//! - `subscription` - Client subscription lifecycle, backoff and decision machine

pub mod foundation;
pub mod push;
pub mod stats;
pub mod subscription;
