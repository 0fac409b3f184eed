//! Date-range filter applied to statistics queries.
//!
//! A filter narrows a snapshot to records created inside the half-open range
//! `[start, end)`. Callers pass the two bounds independently (query
//! parameters); only a request carrying *both* bounds is narrowed. A single
//! bound is deliberately treated as no filter at all.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, ValidationError};

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl DateRange {
    /// Creates a range, rejecting `start > end`.
    ///
    /// `start == end` is allowed and matches nothing.
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, ValidationError> {
        if start.is_after(&end) {
            return Err(ValidationError::InvertedRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Builds an optional filter from raw `start`/`end` query bounds.
    ///
    /// Returns `Ok(None)` unless both bounds are present and non-blank.
    /// Bounds accept RFC 3339 timestamps or plain `YYYY-MM-DD` dates
    /// (interpreted as midnight UTC).
    pub fn from_bounds(
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Option<Self>, ValidationError> {
        let start = start.map(str::trim).filter(|s| !s.is_empty());
        let end = end.map(str::trim).filter(|s| !s.is_empty());

        match (start, end) {
            (Some(start), Some(end)) => {
                let start = parse_bound("start", start)?;
                let end = parse_bound("end", end)?;
                Self::new(start, end).map(Some)
            }
            (None, None) => Ok(None),
            _ => {
                tracing::debug!("Single date bound supplied; treating request as unfiltered");
                Ok(None)
            }
        }
    }

    /// Query-string pairs for re-addressing a request with this range.
    pub fn query_pairs(&self) -> [(&'static str, String); 2] {
        [("start", self.start.to_rfc3339()), ("end", self.end.to_rfc3339())]
    }
}

fn parse_bound(field: &str, raw: &str) -> Result<Timestamp, ValidationError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Timestamp::from_datetime(dt.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ValidationError::invalid_format(field, "expected RFC 3339 timestamp or YYYY-MM-DD")
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ValidationError::invalid_format(field, "date out of range"))?;

    Ok(Timestamp::from_datetime(Utc.from_utc_datetime(&midnight)))
}
