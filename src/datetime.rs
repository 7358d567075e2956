//! Date/time helpers.
//!
//! Timestamps are stored as UTC text in `YYYY-MM-DD HH:MM:SS` form so that the
//! same SQL works on SQLite and PostgreSQL and lexical order matches time order.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Storage format for timestamps.
pub const DB_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a UTC datetime for storage.
pub fn to_db(dt: &DateTime<Utc>) -> String {
    dt.format(DB_FORMAT).to_string()
}

/// Current time in storage format.
pub fn now_db() -> String {
    to_db(&Utc::now())
}

/// Storage-format timestamp `delta` away from now (negative for the past).
pub fn db_offset_from_now(delta: Duration) -> String {
    to_db(&(Utc::now() + delta))
}

/// Parse a stored timestamp (also accepts RFC3339).
pub fn parse_db(datetime_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(datetime_str, DB_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(datetime_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a stored timestamp to RFC3339 for API responses.
///
/// Values that are not in storage format are returned unchanged.
pub fn to_rfc3339(datetime_str: &str) -> String {
    match NaiveDateTime::parse_from_str(datetime_str, DB_FORMAT) {
        Ok(_) => format!("{}Z", datetime_str.replace(' ', "T")),
        Err(_) => datetime_str.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_to_db() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(to_db(&dt), "2024-01-15 10:30:00");
    }

    #[test]
    fn test_parse_db_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(parse_db(&to_db(&dt)), Some(dt));
    }

    #[test]
    fn test_parse_db_rfc3339() {
        let parsed = parse_db("2024-01-15T10:30:00+09:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_db_invalid() {
        assert!(parse_db("not a date").is_none());
    }

    #[test]
    fn test_to_rfc3339() {
        assert_eq!(to_rfc3339("2024-01-15 10:30:00"), "2024-01-15T10:30:00Z");
        assert_eq!(to_rfc3339("garbage"), "garbage");
    }

    #[test]
    fn test_offsets_are_ordered() {
        let past = db_offset_from_now(Duration::hours(-1));
        let future = db_offset_from_now(Duration::hours(1));
        assert!(past < now_db());
        assert!(now_db() < future);
    }
}
