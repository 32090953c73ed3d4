//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC time as RFC 3339 with millisecond precision (`2025-10-14T12:00:00.000Z`)
pub fn now_rfc3339() -> String {
    to_rfc3339(&now())
}

/// Format a timestamp the way file records store it
pub fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp, returning None on malformed input
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_rfc3339_round_trips() {
        let formatted = now_rfc3339();
        assert!(formatted.ends_with('Z'));
        assert!(parse_rfc3339(&formatted).is_some());
    }

    #[test]
    fn test_parse_rfc3339_rejects_garbage() {
        assert!(parse_rfc3339("yesterday").is_none());
        assert!(parse_rfc3339("").is_none());
    }

    #[test]
    fn test_to_rfc3339_uses_millis() {
        let ts = parse_rfc3339("2025-10-14T12:00:00Z").unwrap();
        assert_eq!(to_rfc3339(&ts), "2025-10-14T12:00:00.000Z");
    }
}
