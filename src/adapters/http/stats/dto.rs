//! Request and response DTOs for the statistics API.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, ValidationError};
use crate::domain::stats::DateRange;

/// Standard error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: "SERVICE_UNAVAILABLE".to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            details: None,
        }
    }
}

/// `?start=...&end=...` query parameters.
///
/// Both bounds are needed to narrow a query; one alone is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl FilterParams {
    pub fn to_filter(&self) -> Result<Option<DateRange>, ValidationError> {
        DateRange::from_bounds(self.start.as_deref(), self.end.as_deref())
    }
}

/// Body of `POST /trigger-update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerAck {
    pub accepted: bool,
    pub message: String,
    pub timestamp: Timestamp,
}

impl TriggerAck {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            message: "Statistics update triggered".to_string(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub broadcasting: bool,
    pub connected_clients: usize,
    pub timestamp: Timestamp,
}
