//! Time boundary normalization
//!
//! Sources take their query window as `YYYY-MM-DD HH:MM:SS` in UTC. Config
//! files may give boundaries as ISO-8601 strings, TOML datetimes or Unix
//! epoch seconds; everything is funneled through [`normalize`].

use crate::error::{AppError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Canonical boundary format expected by sources
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

/// A time boundary as supplied by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeBoundary {
    /// ISO-8601 text
    Text(String),
    /// Native timestamp
    Timestamp(DateTime<Utc>),
}

impl From<&str> for TimeBoundary {
    fn from(value: &str) -> Self {
        TimeBoundary::Text(value.to_string())
    }
}

impl From<String> for TimeBoundary {
    fn from(value: String) -> Self {
        TimeBoundary::Text(value)
    }
}

impl From<DateTime<Utc>> for TimeBoundary {
    fn from(value: DateTime<Utc>) -> Self {
        TimeBoundary::Timestamp(value)
    }
}

impl TimeBoundary {
    /// Build a boundary from Unix epoch seconds
    pub fn from_epoch_secs(secs: i64) -> Result<Self> {
        DateTime::from_timestamp(secs, 0)
            .map(TimeBoundary::Timestamp)
            .ok_or_else(|| AppError::Format(format!("epoch seconds out of range: {}", secs)))
    }

    /// Resolve to a UTC instant
    pub fn to_utc(&self) -> Result<DateTime<Utc>> {
        match self {
            TimeBoundary::Text(s) => parse_iso8601(s),
            TimeBoundary::Timestamp(dt) => Ok(*dt),
        }
    }
}

/// Normalize a boundary to `YYYY-MM-DD HH:MM:SS` (UTC, fractional seconds truncated)
///
/// Text without an offset is read as UTC, not as the host's local time.
/// Give an explicit offset (`+02:00`, `Z`) to mean anything else.
pub fn normalize(boundary: &TimeBoundary) -> Result<String> {
    Ok(boundary.to_utc()?.format(CANONICAL_FORMAT).to_string())
}

/// Parse an ISO-8601 string into a UTC instant
///
/// Strings without an offset are taken as UTC. A bare date means midnight.
/// Seconds may be omitted.
pub fn parse_iso8601(input: &str) -> Result<DateTime<Utc>> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    // A `Z` suffix on a form rfc3339 rejects (no seconds) is the same as no offset
    let naive_part = s.strip_suffix('Z').unwrap_or(s);
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_part, fmt) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(AppError::Format(format!(
        "'{}' is not an ISO-8601 datetime",
        input
    )))
}
