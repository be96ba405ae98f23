//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whole minutes elapsed from `earlier` to `later`, floored.
///
/// A negative span (clock skew, timestamps from the future) yields 0.
pub fn minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u64 {
    let millis = later.signed_duration_since(earlier).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis / 60_000) as u64
    }
}

/// Parse an RFC 3339 timestamp into UTC, returning None when malformed
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
