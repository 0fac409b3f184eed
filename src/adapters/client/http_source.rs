//! HTTP implementation of StatsSource.
//!
//! Opens `GET {base}/stats-stream` as a streaming body and decodes SSE
//! frames incrementally; refreshes go to `GET {base}/basic-stats`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::{Client, Response, StatusCode};

use crate::domain::foundation::Timestamp;
use crate::domain::push::PushFrame;
use crate::domain::stats::{DateRange, StatsSnapshot};
use crate::ports::{PushStream, SourceError, StatsSource};

use super::sse_decoder::{SseDecoder, SseFrame};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Statistics server reached over HTTP.
#[derive(Clone)]
pub struct HttpStatsSource {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpStatsSource {
    /// Creates a source rooted at `base_url` (e.g. `http://host:8080/api`).
    ///
    /// `request_timeout` bounds snapshot fetches only; the push stream is
    /// long-lived and only the connect phase is bounded.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn check_stream_status(response: Response) -> Result<Response, SourceError> {
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                Err(SourceError::Unsupported)
            }
            s if !s.is_success() => Err(SourceError::Status {
                status: s.as_u16(),
            }),
            _ => {
                let is_event_stream = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.starts_with("text/event-stream"));
                if is_event_stream {
                    Ok(response)
                } else {
                    Err(SourceError::Unsupported)
                }
            }
        }
    }
}

fn decode_frame(frame: SseFrame) -> Option<Result<PushFrame, SourceError>> {
    match PushFrame::decode(&frame.event, &frame.data) {
        Ok(Some(decoded)) => Some(Ok(decoded)),
        Ok(None) => {
            tracing::trace!(event = %frame.event, "Ignoring unknown push event");
            None
        }
        Err(err) => Some(Err(err.into())),
    }
}

#[async_trait]
impl StatsSource for HttpStatsSource {
    async fn open_stream(&self, filter: Option<&DateRange>) -> Result<PushStream, SourceError> {
        let mut request = self
            .client
            .get(self.url("stats-stream"))
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(range) = filter {
            request = request.query(&range.query_pairs());
        }

        let response = Self::check_stream_status(request.send().await?)?;
        tracing::debug!(filtered = filter.is_some(), "Push stream opened");

        let mut decoder = SseDecoder::new();
        let frames = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder
                    .push(&bytes)
                    .into_iter()
                    .filter_map(decode_frame)
                    .collect::<Vec<_>>(),
                Err(err) => vec![Err(SourceError::from(err))],
            })
            .flat_map(stream::iter);

        Ok(Box::pin(frames))
    }

    async fn fetch_snapshot(&self, filter: Option<&DateRange>) -> Result<StatsSnapshot, SourceError> {
        let mut request = self
            .client
            .get(self.url("basic-stats"))
            .timeout(self.request_timeout)
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(PRAGMA, "no-cache")
            .query(&[("_t", Timestamp::now().as_datetime().timestamp_millis())]);
        if let Some(range) = filter {
            request = request.query(&range.query_pairs());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
            });
        }

        let snapshot = response.json::<StatsSnapshot>().await?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let source = HttpStatsSource::new("http://localhost:8080/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(source.url("basic-stats"), "http://localhost:8080/api/basic-stats");
    }

    #[test]
    fn unknown_events_are_dropped() {
        let frame = SseFrame {
            id: None,
            event: "ping".into(),
            data: "{}".into(),
        };
        assert!(decode_frame(frame).is_none());
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let frame = SseFrame {
            id: Some("1".into()),
            event: "stats-update".into(),
            data: "{not json".into(),
        };
        assert!(matches!(decode_frame(frame), Some(Err(SourceError::Decode(_)))));
    }
}
