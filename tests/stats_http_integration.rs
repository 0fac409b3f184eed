//! Integration tests for the statistics HTTP surface.
//!
//! Requests go through the real router (CORS, timeout and trace layers
//! included) backed by in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

use stats_sync::adapters::memory::ScriptedProvider;
use stats_sync::adapters::{
    serve_until, stats_router, BroadcastManager, BroadcastSettings, InMemoryChangeBus,
    StatsAppState,
};
use stats_sync::config::{ServerConfig, StreamConfig};
use stats_sync::domain::stats::DateRange;
use stats_sync::ports::{ChangePublisher, SnapshotProvider};

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestApp {
    router: Router,
    provider: Arc<ScriptedProvider>,
    bus: InMemoryChangeBus,
    manager: Arc<BroadcastManager>,
}

fn test_app() -> TestApp {
    let provider = Arc::new(ScriptedProvider::new());
    let bus = InMemoryChangeBus::new();
    let dyn_provider: Arc<dyn SnapshotProvider> = provider.clone();
    let changes: Arc<dyn ChangePublisher> = Arc::new(bus.clone());
    let manager = Arc::new(BroadcastManager::new(
        dyn_provider.clone(),
        BroadcastSettings::default(),
    ));

    let state = StatsAppState {
        manager: manager.clone(),
        provider: dyn_provider,
        changes,
        stream: StreamConfig::default(),
    };
    let router = stats_router(state, &ServerConfig::default());

    TestApp {
        router,
        provider,
        bus,
        manager,
    }
}

async fn get(router: &Router, uri: &str) -> axum::response::Response {
    router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// GET /api/basic-stats
// =============================================================================

#[tokio::test]
async fn basic_stats_returns_snapshot_with_no_cache_headers() {
    let app = test_app();

    let response = get(&app.router, "/api/basic-stats").await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers["cache-control"],
        "no-cache, no-store, must-revalidate, max-age=0"
    );
    assert_eq!(headers["pragma"], "no-cache");
    assert_eq!(headers["expires"], "0");
    assert_eq!(headers["surrogate-control"], "no-store");
    assert!(headers.contains_key("x-request-time"));
    assert!(headers.contains_key("x-execution-time-ms"));

    let body = json_body(response).await;
    assert_eq!(body["totalEvents"], 1);
    assert!(body["generatedAt"].is_string());
    assert!(body["dateFilter"].is_null());
    assert_eq!(app.provider.calls(), vec![None]);
}

#[tokio::test]
async fn basic_stats_echoes_filter() {
    let app = test_app();

    let response = get(&app.router, "/api/basic-stats?start=2025-02-01&end=2025-02-28").await;

    assert_eq!(response.status(), StatusCode::OK);
    let expected = DateRange::from_bounds(Some("2025-02-01"), Some("2025-02-28"))
        .unwrap()
        .unwrap();
    assert_eq!(app.provider.calls(), vec![Some(expected)]);

    let body = json_body(response).await;
    assert!(body["dateFilter"]["start"]
        .as_str()
        .unwrap()
        .starts_with("2025-02-01T00:00:00"));
}

#[tokio::test]
async fn single_bound_is_treated_as_unfiltered() {
    let app = test_app();

    let response = get(&app.router, "/api/basic-stats?start=2025-02-01").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.provider.calls(), vec![None]);
}

#[tokio::test]
async fn inverted_range_is_rejected() {
    let app = test_app();

    let response = get(&app.router, "/api/basic-stats?start=2025-03-01&end=2025-02-01").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["pragma"], "no-cache");
    let body = json_body(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");
    assert_eq!(app.provider.call_count(), 0);
}

#[tokio::test]
async fn provider_failure_is_service_error() {
    let app = test_app();
    app.provider.fail_next(1);

    let response = get(&app.router, "/api/basic-stats").await;

    assert!(response.status().is_server_error());
    assert_eq!(
        response.headers()["cache-control"],
        "no-cache, no-store, must-revalidate, max-age=0"
    );
}

// =============================================================================
// POST /api/trigger-update
// =============================================================================

#[tokio::test]
async fn trigger_update_publishes_once_and_accepts() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::post("/api/trigger-update")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(app.bus.publish_count(), 1);
    let body = json_body(response).await;
    assert_eq!(body["accepted"], true);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn trigger_update_rejects_get() {
    let app = test_app();

    let response = get(&app.router, "/api/trigger-update").await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(app.bus.publish_count(), 0);
}

// =============================================================================
// GET /api/health
// =============================================================================

#[tokio::test]
async fn health_reports_broadcast_status() {
    let app = test_app();
    app.manager.start(&app.bus);

    let response = get(&app.router, "/api/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["broadcasting"], true);
    assert_eq!(body["connectedClients"], 0);

    app.manager.shutdown().await;
}

// =============================================================================
// GET /api/stats-stream
// =============================================================================

#[tokio::test]
async fn stats_stream_opens_event_stream_with_ack_first() {
    let app = test_app();

    let response = get(&app.router, "/api/stats-stream").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(response.headers()["x-accel-buffering"], "no");
    assert_eq!(app.manager.client_count(), 1);

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("event: connected"), "unexpected first frame: {text}");

    drop(body);
    tokio::task::yield_now().await;
    assert_eq!(app.manager.client_count(), 0);
}

#[tokio::test]
async fn stats_stream_rejects_malformed_filter() {
    let app = test_app();

    let response = get(&app.router, "/api/stats-stream?start=yesterday&end=today").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.manager.client_count(), 0);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = test_app();

    let response = get(&app.router, "/stats-stream").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Graceful shutdown
// =============================================================================

#[tokio::test]
async fn shutdown_signal_stops_server_with_open_stream() {
    let app = test_app();
    app.manager.start(&app.bus);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_until(
        listener,
        app.router.clone(),
        app.manager.clone(),
        async move {
            let _ = stop_rx.await;
        },
    ));

    let response = reqwest::get(format!("http://{addr}/api/stats-stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let mut body = response.bytes_stream();
    let first = body.next().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("event: connected"));
    assert_eq!(app.manager.client_count(), 1);

    stop_tx.send(()).unwrap();
    let stopped = tokio::time::timeout(Duration::from_secs(5), server).await;

    assert!(matches!(stopped, Ok(Ok(Ok(())))), "server did not stop: {stopped:?}");
    assert_eq!(app.manager.client_count(), 0);
    assert!(!app.manager.is_running());
}
