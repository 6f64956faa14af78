//! Timestamp utilities
//!
//! Persisted timestamps are fixed-width RFC 3339 UTC strings
//! (`2024-05-01T09:30:00.000000Z`). Fixed width keeps SQL `MAX()` and `<`
//! comparisons on TEXT columns chronological.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp (any RFC 3339 offset is accepted and normalized to UTC)
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", raw, e)))
}

/// Parse an optional stored timestamp
pub fn parse_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}
