//! Time parsing helpers for upstream payloads
//!
//! Upstreams are inconsistent about date formats: most emit RFC 3339 with a
//! `Z` suffix, the e-commerce system emits naive ISO 8601 without an offset.
//! Both are accepted; naive values are taken as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse an optional upstream timestamp, tolerating both RFC 3339 and naive
/// ISO 8601 forms. Unparseable or empty values come back as `None`.
pub fn parse_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
        if format == "%Y-%m-%d" {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, format) {
                return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
            }
        }
    }

    None
}
