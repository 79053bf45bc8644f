//! Date strings exchanged with the trips backend.
//!
//! Both directions use one canonical layout, ISO-8601 with milliseconds and a
//! numeric offset. Older servers and clients wrote `M-d-yyyy H:m:s` on the
//! create path, so parsing still accepts that layout (read as UTC).

use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, SecondsFormat, Utc};

const LEGACY_FORMAT: &str = "%m-%d-%Y %H:%M:%S";

/// Formats an instant the way the backend expects it, e.g. `2024-05-01T10:30:00.000+00:00`.
pub fn format_wire_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Drops everything below the millisecond, the finest precision the wire keeps.
/// Dates stored locally go through this so a push and the following fetch
/// agree on the value.
pub fn to_wire_precision(date: DateTime<Utc>) -> DateTime<Utc> {
    date.duration_trunc(Duration::milliseconds(1)).unwrap_or(date)
}

/// Parses a backend date string. Returns `None` for blank or unrecognized input.
pub fn parse_wire_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }

    // Offsets written without a colon, e.g. +0000
    if let Ok(date) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(date.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, LEGACY_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
