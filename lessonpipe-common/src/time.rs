//! Timestamp utilities
//!
//! All persisted timestamps are RFC 3339 UTC strings; the webhook wire
//! format uses `YYYY-MM-DD` dates and `HH:MM` clock times.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC timestamp as an RFC 3339 string
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an RFC 3339 timestamp stored as TEXT
pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parse a stored meeting timestamp. Accepts RFC 3339 or the bare
/// `YYYY-MM-DD HH:MM:SS` form used by upstream schedulers.
pub fn parse_meeting_time(s: &str) -> Option<DateTime<Utc>> {
    if let Some(dt) = parse_rfc3339(s) {
        return Some(dt);
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| naive.and_utc())
        .ok()
}

/// Format the date portion for the webhook payload (`YYYY-MM-DD`)
pub fn wire_date(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

/// Format the clock portion for the webhook payload (`HH:MM`)
pub fn wire_time(dt: &DateTime<Utc>) -> String {
    dt.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meeting_time_formats() {
        let a = parse_meeting_time("2025-11-24T17:30:00Z").unwrap();
        let b = parse_meeting_time("2025-11-24 17:30:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(wire_date(&a), "2025-11-24");
        assert_eq!(wire_time(&a), "17:30");
    }

    #[test]
    fn test_parse_meeting_time_rejects_garbage() {
        assert!(parse_meeting_time("not a time").is_none());
    }
}
