//! DateTime helpers for LLM-extracted dates and Neo4j datetime literals.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a datetime in any of the shapes LLMs and Neo4j hand back.
///
/// RFC 3339 first (this also covers Neo4j's nanosecond `...000000000Z`), then
/// naive date-times assumed UTC, then bare dates at midnight UTC.
/// Returns `None` for blank input, `"null"`, or unrecognised formats.
pub fn parse_flexible_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|ndt| Utc.from_utc_datetime(&ndt))
    })
}

/// Format as the ISO 8601 string Cypher's `datetime()` accepts, nanosecond precision.
pub fn format_neo4j_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_flexible_datetime("2024-01-15T10:30:00+05:00").expect("should parse");
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 15, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(parse_flexible_datetime("2024-01-15T10:30:00"), Some(expected));
        assert_eq!(parse_flexible_datetime("2024-01-15 10:30:00"), Some(expected));
    }

    #[test]
    fn test_parse_dates_only() {
        let midnight = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_flexible_datetime("2024-01-15"), Some(midnight));
        assert_eq!(parse_flexible_datetime("01/15/2024"), Some(midnight));
    }

    #[test]
    fn test_parse_neo4j_nanoseconds() {
        let dt = parse_flexible_datetime("2024-06-01T12:00:00.123456789Z").expect("should parse");
        assert_eq!(dt.nanosecond(), 123_456_789);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_flexible_datetime("").is_none());
        assert!(parse_flexible_datetime("null").is_none());
        assert!(parse_flexible_datetime("last tuesday").is_none());
        assert!(parse_flexible_datetime("2024-13-01").is_none());
    }

    #[test]
    fn test_format_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 8, 45, 30).unwrap();
        let formatted = format_neo4j_datetime(&dt);
        assert_eq!(formatted, "2024-06-15T08:45:30.000000000Z");
        assert_eq!(parse_flexible_datetime(&formatted), Some(dt));
    }
}
