//! Stats Sync - Real-time dashboard statistics synchronization
//!
//! The server side recomputes dashboard statistics when data changes (or on
//! a fixed interval) and pushes each snapshot to every connected dashboard
//! over Server-Sent Events. The client side keeps one dashboard subscribed
//! through disconnects, filter edits and server outages.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
