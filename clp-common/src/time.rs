//! Timestamp utilities
//!
//! Datastore timestamps arrive either as RFC 3339 strings with an offset
//! (`timestamptz`) or as naive ISO strings with optional fractional seconds
//! (`timestamp`). Both are read as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a datastore timestamp, with or without offset
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    // Postgres text output uses a space separator and "+00" offsets
    let normalized = value.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Serde adapter for optional timestamps in either datastore format
pub mod flexible_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => super::parse_timestamp(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_timestamp("2024-05-01T12:34:56.123456+08:00").unwrap();
        assert_eq!(dt.hour(), 4);
        assert_eq!(dt.day(), 1);
    }

    #[test]
    fn test_parse_naive_fractional() {
        let dt = parse_timestamp("2024-05-01T12:34:56.789").unwrap();
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.second(), 56);
    }

    #[test]
    fn test_parse_postgres_text_format() {
        let dt = parse_timestamp("2024-05-01 12:34:56+00").unwrap();
        assert_eq!(dt.minute(), 34);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }
}
