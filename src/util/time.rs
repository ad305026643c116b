//! UTC normalization helpers.
//!
//! Upstream parsers occasionally hand back naive timestamps. Everything past
//! the adapter boundary is `DateTime<Utc>`; mixed lists are normalized here
//! before any comparison.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Promote a possibly-naive timestamp to UTC. Naive inputs are taken as
/// already being in UTC wall time.
pub fn ensure_utc(naive_or_utc: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive_or_utc)
}

/// Parse the handful of timestamp shapes the vendors emit. Accepts RFC 3339,
/// `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DDTHH:MM:SS` (naive, promoted to UTC).
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ensure_utc(naive));
        }
    }
    None
}

/// Whole hours elapsed between two instants, never negative.
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    ((later - earlier).num_minutes().max(0) as f64) / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_instant("2026-05-10T20:45:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 5, 10, 18, 45, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_promoted_to_utc() {
        let dt = parse_instant("2026-05-10 20:45:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 5, 10, 20, 45, 0).unwrap());
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_instant("tomorrow-ish").is_none());
        assert!(parse_instant("").is_none());
    }

    #[test]
    fn test_hours_between_clamps_negative() {
        let a = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 5, 10, 18, 0, 0).unwrap();
        assert_eq!(hours_between(a, b), 6.0);
        assert_eq!(hours_between(b, a), 0.0);
    }
}
