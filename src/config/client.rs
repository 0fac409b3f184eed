//! Subscription client configuration

use serde::Deserialize;
use std::time::Duration;

use crate::domain::stats::DateRange;
use crate::domain::subscription::{ReconnectPolicy, SubscriptionSettings};

use super::error::{ConfigError, ValidationError};

/// Settings for a client subscribing to the statistics stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the statistics API, e.g. `http://localhost:8080/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Use the push stream; when false the client only polls
    #[serde(default = "default_push_enabled")]
    pub push_enabled: bool,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Reconnect attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Quiet period applied to filter edits
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Upper bound on how long the loading flag may stay set
    #[serde(default = "default_watchdog")]
    pub watchdog_ms: u64,

    /// Poll interval when push is unavailable
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Minimum spacing between on-demand requests
    #[serde(default = "default_min_request_spacing")]
    pub min_request_spacing_ms: u64,

    /// Timeout for one on-demand request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Optional filter start bound (RFC 3339 or YYYY-MM-DD)
    pub start: Option<String>,

    /// Optional filter end bound (RFC 3339 or YYYY-MM-DD)
    pub end: Option<String>,
}

impl ClientConfig {
    /// Loads only the `client` section from `STATS_SYNC__CLIENT__*`.
    ///
    /// A missing section yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("STATS_SYNC")
                    .separator("__"),
            )
            .build()?;

        match settings.get::<ClientConfig>("client") {
            Ok(config) => Ok(config),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }

    pub fn subscription_settings(&self) -> SubscriptionSettings {
        SubscriptionSettings {
            push_enabled: self.push_enabled,
            reconnect: self.reconnect_policy(),
            debounce: Duration::from_millis(self.debounce_ms),
            watchdog: Duration::from_millis(self.watchdog_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn min_request_spacing(&self) -> Duration {
        Duration::from_millis(self.min_request_spacing_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured filter; a single bound means no filter.
    pub fn filter(&self) -> Result<Option<DateRange>, ValidationError> {
        DateRange::from_bounds(self.start.as_deref(), self.end.as_deref())
            .map_err(|err| ValidationError::InvalidFilter(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.base_delay_ms == 0 {
            return Err(ValidationError::ZeroInterval("client.base_delay_ms"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        if self.max_attempts == 0 {
            return Err(ValidationError::ZeroAttempts);
        }
        if self.watchdog_ms == 0 {
            return Err(ValidationError::ZeroInterval("client.watchdog_ms"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::ZeroInterval("client.poll_interval_ms"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        self.filter()?;
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            push_enabled: default_push_enabled(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
            debounce_ms: default_debounce(),
            watchdog_ms: default_watchdog(),
            poll_interval_ms: default_poll_interval(),
            min_request_spacing_ms: default_min_request_spacing(),
            request_timeout_secs: default_request_timeout(),
            start: None,
            end: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_push_enabled() -> bool {
    true
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_debounce() -> u64 {
    300
}

fn default_watchdog() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    10_000
}

fn default_min_request_spacing() -> u64 {
    1_000
}

fn default_request_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_policy() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());

        let settings = config.subscription_settings();
        assert!(settings.push_enabled);
        assert_eq!(settings.reconnect, ReconnectPolicy::default());
        assert_eq!(settings.debounce, Duration::from_millis(300));
        assert_eq!(settings.watchdog, Duration::from_secs(10));
        assert_eq!(config.min_request_spacing(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_bounds_validated() {
        let config = ClientConfig {
            base_delay_ms: 60_000,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidBackoff));

        let config = ClientConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::ZeroAttempts));
    }

    #[test]
    fn test_filter_requires_both_bounds() {
        let config = ClientConfig {
            start: Some("2025-02-01".to_string()),
            ..Default::default()
        };
        assert_eq!(config.filter().unwrap(), None);

        let config = ClientConfig {
            start: Some("2025-02-01".to_string()),
            end: Some("2025-02-28".to_string()),
            ..Default::default()
        };
        assert!(config.filter().unwrap().is_some());
    }

    #[test]
    fn test_inverted_filter_is_invalid() {
        let config = ClientConfig {
            start: Some("2025-03-01".to_string()),
            end: Some("2025-02-01".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidFilter(_))));
    }

    #[test]
    fn test_base_url_must_be_http() {
        let config = ClientConfig {
            base_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidBaseUrl(_))));
    }
}
