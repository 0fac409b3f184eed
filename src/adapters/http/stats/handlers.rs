//! HTTP handlers for the statistics API.
//!
//! `/basic-stats` always reflects current state: every response, error or
//! not, carries headers forbidding intermediary caching.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Json, Query, State};
use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::adapters::sse::BroadcastManager;
use crate::config::StreamConfig;
use crate::domain::foundation::{Timestamp, ValidationError};
use crate::domain::stats::StatsSnapshot;
use crate::ports::{ChangePublisher, SnapshotError, SnapshotProvider};

use super::dto::{ErrorResponse, FilterParams, HealthResponse, TriggerAck};

// ════════════════════════════════════════════════════════════════════════════════
// Error Type
// ════════════════════════════════════════════════════════════════════════════════

/// Statistics API error that implements IntoResponse.
#[derive(Debug)]
pub enum StatsApiError {
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for StatsApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            StatsApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::bad_request(msg))
            }
            StatsApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorResponse::unavailable(msg))
            }
            StatsApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::internal(msg))
            }
        };
        (status, Json(error)).into_response()
    }
}

impl From<ValidationError> for StatsApiError {
    fn from(error: ValidationError) -> Self {
        StatsApiError::BadRequest(error.to_string())
    }
}

impl From<SnapshotError> for StatsApiError {
    fn from(error: SnapshotError) -> Self {
        match error {
            SnapshotError::Timeout | SnapshotError::Unavailable(_) => {
                StatsApiError::Unavailable("Statistics are temporarily unavailable".to_string())
            }
            SnapshotError::Database(_) => {
                StatsApiError::Internal("Failed to compute statistics".to_string())
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the statistics routes.
#[derive(Clone)]
pub struct StatsAppState {
    pub manager: Arc<BroadcastManager>,
    pub provider: Arc<dyn SnapshotProvider>,
    pub changes: Arc<dyn ChangePublisher>,
    pub stream: StreamConfig,
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/basic-stats - One snapshot, computed now.
pub async fn basic_stats(
    State(state): State<StatsAppState>,
    Query(params): Query<FilterParams>,
) -> Response {
    let started = Instant::now();
    let request_time = Timestamp::now();

    let result = compute(&state, &params).await;
    let headers = no_cache_headers(request_time, started.elapsed());

    match result {
        Ok(snapshot) => (headers, Json(snapshot)).into_response(),
        Err(error) => (headers, error).into_response(),
    }
}

async fn compute(
    state: &StatsAppState,
    params: &FilterParams,
) -> Result<StatsSnapshot, StatsApiError> {
    let filter = params.to_filter()?;
    state.provider.compute_snapshot(filter).await.map_err(|err| {
        tracing::warn!(error = %err, filter = ?filter, "On-demand snapshot failed");
        StatsApiError::from(err)
    })
}

/// POST /api/trigger-update - Publish one change signal.
///
/// Returns immediately; the resulting broadcast happens in the background.
pub async fn trigger_update(State(state): State<StatsAppState>) -> impl IntoResponse {
    state.changes.publish();
    tracing::info!(
        connected_clients = state.manager.client_count(),
        "Manual statistics update triggered"
    );
    (StatusCode::ACCEPTED, Json(TriggerAck::accepted()))
}

/// GET /api/health
pub async fn health(State(state): State<StatsAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        broadcasting: state.manager.is_running(),
        connected_clients: state.manager.client_count(),
        timestamp: Timestamp::now(),
    })
}

fn no_cache_headers(request_time: Timestamp, elapsed: Duration) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate, max-age=0"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    headers.insert(
        HeaderName::from_static("surrogate-control"),
        HeaderValue::from_static("no-store"),
    );
    if let Ok(value) = HeaderValue::from_str(&request_time.to_rfc3339()) {
        headers.insert(HeaderName::from_static("x-request-time"), value);
    }
    headers.insert(
        HeaderName::from_static("x-execution-time-ms"),
        HeaderValue::from(elapsed.as_millis() as u64),
    );
    headers
}
