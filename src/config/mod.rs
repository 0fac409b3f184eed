//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `STATS_SYNC` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use stats_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod client;
mod database;
mod error;
mod server;
mod stream;

pub use client::ClientConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use server::{Environment, LogFormat, ServerConfig};
pub use stream::StreamConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database the statistics are computed from
    pub database: DatabaseConfig,

    /// Push stream and broadcast timing
    #[serde(default)]
    pub stream: StreamConfig,

    /// Subscription client settings (used by the watcher binary)
    #[serde(default)]
    pub client: ClientConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `STATS_SYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `STATS_SYNC__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `STATS_SYNC__DATABASE__URL=...` -> `database.url = ...`
    /// - `STATS_SYNC__STREAM__BROADCAST_INTERVAL_MS=30000` -> `stream.broadcast_interval_ms`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("STATS_SYNC")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.stream.validate()?;
        self.client.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "STATS_SYNC__DATABASE__URL",
        "STATS_SYNC__SERVER__PORT",
        "STATS_SYNC__SERVER__ENVIRONMENT",
        "STATS_SYNC__STREAM__BROADCAST_INTERVAL_MS",
        "STATS_SYNC__CLIENT__MAX_ATTEMPTS",
        "STATS_SYNC__CLIENT__PUSH_ENABLED",
    ];

    fn set_minimal_env() {
        env::set_var("STATS_SYNC__DATABASE__URL", "postgresql://test@localhost/orders");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.database.url, "postgresql://test@localhost/orders");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.stream.broadcast_interval_ms, 30_000);
        assert_eq!(config.client.max_attempts, 5);
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("STATS_SYNC__SERVER__PORT", "3000");
        env::set_var("STATS_SYNC__SERVER__ENVIRONMENT", "production");
        env::set_var("STATS_SYNC__STREAM__BROADCAST_INTERVAL_MS", "5000");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.is_production());
        assert_eq!(config.stream.broadcast_interval_ms, 5_000);
    }

    #[test]
    fn test_client_section_loads_alone() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("STATS_SYNC__CLIENT__MAX_ATTEMPTS", "3");
        env::set_var("STATS_SYNC__CLIENT__PUSH_ENABLED", "false");
        let result = ClientConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.max_attempts, 3);
        assert!(!config.push_enabled);
        assert_eq!(config.debounce_ms, 300);
    }

    #[test]
    fn test_client_section_defaults_when_absent() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let config = ClientConfig::load().unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/api");
    }
}
