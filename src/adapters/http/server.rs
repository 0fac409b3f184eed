//! Server loop with ordered shutdown.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::adapters::sse::BroadcastManager;

/// Serves `app` until `signal` resolves, then drains connections.
///
/// Open push streams end only when their transports close, so the manager
/// shuts down inside the graceful-shutdown future, before draining starts.
pub async fn serve_until(
    listener: TcpListener,
    app: Router,
    manager: Arc<BroadcastManager>,
    signal: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            tracing::info!(
                client_count = manager.client_count(),
                "Closing push streams before draining connections"
            );
            manager.shutdown().await;
        })
        .await
}
