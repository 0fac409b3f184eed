//! Push stream configuration

use serde::Deserialize;
use std::time::Duration;

use crate::adapters::sse::BroadcastSettings;

use super::error::ValidationError;

/// Server-side push stream settings
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Periodic broadcast interval in milliseconds
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_ms: u64,

    /// Quiet period after the last change signal before broadcasting
    #[serde(default = "default_coalesce_window")]
    pub coalesce_window_ms: u64,

    /// Longest a burst of change signals may postpone its broadcast,
    /// measured from the first signal
    #[serde(default = "default_coalesce_max_wait")]
    pub coalesce_max_wait_ms: u64,

    /// Messages buffered per client before it is considered stuck
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,

    /// Interval between SSE keep-alive comments in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl StreamConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn coalesce_max_wait(&self) -> Duration {
        Duration::from_millis(self.coalesce_max_wait_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            periodic_interval: self.broadcast_interval(),
            coalesce_window: self.coalesce_window(),
            coalesce_max_wait: self.coalesce_max_wait(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.broadcast_interval_ms == 0 {
            return Err(ValidationError::ZeroInterval("stream.broadcast_interval_ms"));
        }
        if self.keep_alive_secs == 0 {
            return Err(ValidationError::ZeroInterval("stream.keep_alive_secs"));
        }
        if self.coalesce_max_wait_ms < self.coalesce_window_ms {
            return Err(ValidationError::InvalidCoalesceBound);
        }
        if self.client_buffer == 0 {
            return Err(ValidationError::ZeroClientBuffer);
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_ms: default_broadcast_interval(),
            coalesce_window_ms: default_coalesce_window(),
            coalesce_max_wait_ms: default_coalesce_max_wait(),
            client_buffer: default_client_buffer(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_broadcast_interval() -> u64 {
    30_000
}

fn default_coalesce_window() -> u64 {
    250
}

fn default_coalesce_max_wait() -> u64 {
    1_000
}

fn default_client_buffer() -> usize {
    32
}

fn default_keep_alive() -> u64 {
    15
}
