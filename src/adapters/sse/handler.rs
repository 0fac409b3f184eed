//! SSE handler for the statistics push stream.
//!
//! Manages the connection lifecycle:
//! 1. Parse the connection's filter from the query string
//! 2. Register with the broadcast manager (sends `connected`)
//! 3. Queue an initial snapshot for the client's filter
//! 4. Stream messages until either side goes away
//! 5. Deregister when the response body is dropped

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream};
use tokio::sync::mpsc;

use crate::adapters::http::stats::{FilterParams, StatsApiError, StatsAppState};
use crate::domain::foundation::ClientId;
use crate::domain::push::PushMessage;

use super::manager::BroadcastManager;
use super::transport::SseTransport;

/// GET /api/stats-stream[?start=..&end=..]
///
/// The filter is fixed for the lifetime of the connection; a client that
/// wants another range reconnects.
pub async fn stats_stream(
    State(state): State<StatsAppState>,
    Query(params): Query<FilterParams>,
) -> Result<Response, StatsApiError> {
    let filter = params.to_filter()?;

    let (transport, rx) = SseTransport::channel(state.stream.client_buffer);
    let client_id = state
        .manager
        .register_client(Arc::new(transport), filter)
        .await
        .map_err(|err| StatsApiError::Unavailable(format!("Stream unavailable: {}", err)))?;

    let manager = state.manager.clone();
    tokio::spawn(async move {
        manager.send_initial_snapshot(client_id).await;
    });

    let guard = DeregisterOnDrop {
        manager: state.manager.clone(),
        client_id,
    };
    let keep_alive = KeepAlive::new()
        .interval(state.stream.keep_alive())
        .text("keep-alive");

    Ok((
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(event_stream(rx, guard)).keep_alive(keep_alive),
    )
        .into_response())
}

fn event_stream(
    rx: mpsc::Receiver<PushMessage>,
    guard: DeregisterOnDrop,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let message = rx.recv().await?;
        Some((Ok(to_event(&message)), (rx, guard)))
    })
}

fn to_event(message: &PushMessage) -> Event {
    Event::default()
        .id(message.id.to_string())
        .event(message.event.as_str())
        .data(&message.data)
}

/// Removes the client from the registry when the response body is dropped,
/// whether the client hung up or the manager closed the stream.
struct DeregisterOnDrop {
    manager: Arc<BroadcastManager>,
    client_id: ClientId,
}

impl Drop for DeregisterOnDrop {
    fn drop(&mut self) {
        if self.manager.deregister_client(&self.client_id) {
            tracing::debug!(client_id = %self.client_id, "Stream closed by client");
        }
    }
}
