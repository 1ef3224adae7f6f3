//! Timestamp formatting and bucket alignment
//!
//! Every timestamp persisted by NoiseMap goes through [`format_timestamp`],
//! which emits a single fixed RFC3339 shape (millisecond precision, UTC `Z`
//! suffix). With one uniform shape, lexicographic comparison of the stored
//! TEXT columns matches chronological order, so SQLite range predicates and
//! ORDER BY work directly against the `timestamp` index.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp in the canonical stored shape,
/// e.g. `2024-01-01T00:00:00.000Z`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored or client-supplied RFC3339 timestamp into UTC
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Validation(format!("Invalid timestamp '{}': {}", s, e)))
}

/// Align a timestamp to the start of its bucket.
///
/// Buckets are contiguous, non-overlapping intervals of `width_seconds`
/// anchored at the Unix epoch, so repeated calls with the same width always
/// produce the same boundaries. Uses Euclidean division so pre-1970
/// timestamps still land on epoch-aligned boundaries.
pub fn bucket_start(ts: DateTime<Utc>, width_seconds: i64) -> i64 {
    debug_assert!(width_seconds > 0);
    ts.timestamp().div_euclid(width_seconds) * width_seconds
}

/// Convert an epoch-seconds bucket boundary back to a UTC timestamp
pub fn from_epoch_seconds(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::Internal(format!("Epoch seconds out of range: {}", secs)))
}
