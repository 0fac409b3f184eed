//! Change bus adapters.
//!
//! - `InMemoryChangeBus` - Process-wide, synchronous change signal

mod in_memory;

pub use in_memory::InMemoryChangeBus;
