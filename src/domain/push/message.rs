//! Wire shape of push messages.
//!
//! Every message has a monotonically increasing id, an event name and a
//! single-line JSON payload:
//!
//! ```text
//! id: 7
//! event: stats-update
//! data: {"totalEvents":12,...,"generatedAt":"2025-02-03T10:00:00Z","dateFilter":null}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ClientId, Timestamp};
use crate::domain::stats::StatsSnapshot;

/// Event names carried on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PushEvent {
    /// One-time acknowledgement sent to a newly registered client.
    #[serde(rename = "connected")]
    Connected,
    /// A statistics snapshot.
    #[serde(rename = "stats-update")]
    StatsUpdate,
}

impl PushEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushEvent::Connected => "connected",
            PushEvent::StatsUpdate => "stats-update",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "connected" => Some(PushEvent::Connected),
            "stats-update" => Some(PushEvent::StatsUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for PushEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the `connected` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub client_id: ClientId,
    pub timestamp: Timestamp,
    pub message: String,
}

impl ConnectedPayload {
    pub fn new(client_id: ClientId, timestamp: Timestamp) -> Self {
        Self {
            client_id,
            timestamp,
            message: "Connected to statistics stream".to_string(),
        }
    }
}

/// One outbound message, payload already serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub id: u64,
    pub event: PushEvent,
    pub data: String,
}

impl PushMessage {
    pub fn connected(id: u64, payload: &ConnectedPayload) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id,
            event: PushEvent::Connected,
            data: serde_json::to_string(payload)?,
        })
    }

    pub fn stats_update(id: u64, snapshot: &StatsSnapshot) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id,
            event: PushEvent::StatsUpdate,
            data: serde_json::to_string(snapshot)?,
        })
    }

    /// Renders the message as an SSE frame, blank-line terminated.
    pub fn to_sse_frame(&self) -> String {
        format!("id: {}\nevent: {}\ndata: {}\n\n", self.id, self.event, self.data)
    }
}

/// A decoded inbound message, as seen by a subscribing client.
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    Connected(ConnectedPayload),
    StatsUpdate(StatsSnapshot),
}

impl PushFrame {
    /// Decodes a frame from its event name and data.
    ///
    /// Unknown event names yield `Ok(None)` so servers can add events
    /// without breaking older clients.
    pub fn decode(event: &str, data: &str) -> Result<Option<Self>, serde_json::Error> {
        match PushEvent::parse(event) {
            Some(PushEvent::Connected) => Ok(Some(PushFrame::Connected(serde_json::from_str(data)?))),
            Some(PushEvent::StatsUpdate) => {
                Ok(Some(PushFrame::StatsUpdate(serde_json::from_str(data)?)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stats::DashboardStats;

    #[test]
    fn connected_message_carries_client_id_and_timestamp() {
        let id = ClientId::new();
        let payload = ConnectedPayload::new(id, Timestamp::now());
        let message = PushMessage::connected(1, &payload).unwrap();

        assert_eq!(message.event, PushEvent::Connected);
        let json: serde_json::Value = serde_json::from_str(&message.data).unwrap();
        assert_eq!(json["clientId"], id.to_string());
        assert!(json["timestamp"].is_string());
        assert!(json["message"].is_string());
    }

    #[test]
    fn sse_frame_layout() {
        let message = PushMessage {
            id: 42,
            event: PushEvent::StatsUpdate,
            data: "{}".to_string(),
        };
        assert_eq!(message.to_sse_frame(), "id: 42\nevent: stats-update\ndata: {}\n\n");
    }

    #[test]
    fn stats_update_data_is_single_line() {
        let snapshot = StatsSnapshot::new(DashboardStats::default(), None, Timestamp::now());
        let message = PushMessage::stats_update(3, &snapshot).unwrap();
        assert!(!message.data.contains('\n'));
    }

    #[test]
    fn decode_round_trips_stats_update() {
        let snapshot = StatsSnapshot::new(DashboardStats::default(), None, Timestamp::now());
        let message = PushMessage::stats_update(3, &snapshot).unwrap();

        let frame = PushFrame::decode("stats-update", &message.data).unwrap();
        assert_eq!(frame, Some(PushFrame::StatsUpdate(snapshot)));
    }

    #[test]
    fn decode_ignores_unknown_events() {
        assert_eq!(PushFrame::decode("heartbeat", "{}").unwrap(), None);
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        assert!(PushFrame::decode("connected", "not json").is_err());
    }

    #[test]
    fn event_names_match_wire() {
        assert_eq!(PushEvent::Connected.to_string(), "connected");
        assert_eq!(PushEvent::parse("stats-update"), Some(PushEvent::StatsUpdate));
        assert_eq!(
            serde_json::to_string(&PushEvent::StatsUpdate).unwrap(),
            "\"stats-update\""
        );
    }
}
