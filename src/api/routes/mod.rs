//! API route handlers

pub mod health;
pub mod ingest;
pub mod query;

use chrono::{DateTime, TimeZone, Utc};

/// Parse a time parameter: unix nanoseconds (all digits) or RFC 3339
pub(crate) fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c == '-') {
        if let Ok(ns) = s.parse::<i64>() {
            return Ok(Utc.timestamp_nanos(ns));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("expected unix nanoseconds or RFC 3339, got '{}'", s))
}
