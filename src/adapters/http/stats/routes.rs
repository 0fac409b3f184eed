//! HTTP routes for the statistics API.

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::sse::stats_stream;
use crate::config::ServerConfig;

use super::handlers::{basic_stats, health, trigger_update, StatsAppState};

/// Creates the statistics routes, relative to the API prefix.
///
/// # Routes
///
/// - `GET /stats-stream` - Push stream (`connected`, then `stats-update` events)
/// - `GET /basic-stats` - One snapshot, never cached
/// - `POST /trigger-update` - Publish one change signal
/// - `GET /health` - Broadcast status and connected client count
pub fn stats_routes() -> Router<StatsAppState> {
    Router::new()
        .route("/stats-stream", get(stats_stream))
        .route("/basic-stats", get(basic_stats))
        .route("/trigger-update", post(trigger_update))
        .route("/health", get(health))
}

/// Creates the complete application router mounted at `/api`.
///
/// # Example
///
/// ```ignore
/// let app = stats_router(state, &config.server);
/// axum::serve(listener, app).await?;
/// ```
pub fn stats_router(state: StatsAppState, server: &ServerConfig) -> Router {
    Router::new()
        .nest("/api", stats_routes())
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(cors_layer(server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Configured origins when given; permissive in development, closed otherwise.
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if server.is_production() {
        CorsLayer::new()
    } else {
        CorsLayer::permissive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_layer_builds_for_every_environment() {
        let _ = cors_layer(&ServerConfig::default());
        let _ = cors_layer(&ServerConfig {
            cors_origins: Some("http://localhost:5173".to_string()),
            ..Default::default()
        });
        let _ = cors_layer(&ServerConfig {
            environment: crate::config::Environment::Production,
            ..Default::default()
        });
    }
}
