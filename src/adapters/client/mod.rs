//! Client adapters - Reaching the statistics server from a dashboard.

mod http_source;
mod sse_decoder;

pub use http_source::HttpStatsSource;
pub use sse_decoder::{SseDecoder, SseFrame};
