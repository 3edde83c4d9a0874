use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Storage timestamp format. Fixed-width fractional seconds keep the text
/// representation lexicographically ordered, which both backends rely on for
/// range comparisons.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// A single normalized sensor observation. Immutable once created; only
/// `timestamp` and `device_id` are guaranteed present. Missing numeric
/// values stay absent, with no interpolation or defaulting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(with = "iso8601")]
    pub timestamp: NaiveDateTime,
    pub device_id: String,
    /// Degrees Celsius
    pub temperature: Option<f64>,
    /// Relative humidity percentage
    pub humidity: Option<f64>,
    pub light_level: Option<i64>,
    pub device_type: String,
    pub version: String,
}

/// A `Reading` as returned from a backend: row id for the SQLite store
/// (`None` for CSV) plus the server-assigned audit timestamp, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReading {
    pub id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
    pub reading: Reading,
}

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Lenient parse: accepts ISO-8601 with or without fractional seconds.
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    raw.parse().ok()
}

/// SQLite's CURRENT_TIMESTAMP uses a space separator; fall back to ISO-8601.
pub(crate) fn parse_created_at(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| parse_timestamp(raw))
}

pub(crate) fn cutoff_hours(hours: i64) -> NaiveDateTime {
    Local::now().naive_local() - Duration::hours(hours)
}

pub(crate) fn cutoff_days(days: i64) -> NaiveDateTime {
    Local::now().naive_local() - Duration::days(days)
}

pub(crate) mod iso8601 {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_roundtrips_through_fixed_format() {
        let ts: NaiveDateTime = "2024-06-01T12:34:56.789012".parse().unwrap();
        let formatted = format_timestamp(&ts);
        assert_eq!(formatted, "2024-06-01T12:34:56.789012");
        assert_eq!(parse_timestamp(&formatted), Some(ts));
    }

    #[test]
    fn parse_accepts_timestamps_without_fraction() {
        let ts = parse_timestamp("2024-06-01T00:00:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-06-01T00:00:00.000000");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_timestamp("not-a-date"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn created_at_accepts_sqlite_default_format() {
        let ts = parse_created_at("2024-06-01 08:00:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-06-01T08:00:00.000000");
    }

    #[test]
    fn reading_serde_uses_iso8601_string() {
        let reading = Reading {
            timestamp: "2024-06-01T00:00:00".parse().unwrap(),
            device_id: "D1".to_owned(),
            temperature: Some(25.0),
            humidity: None,
            light_level: Some(100),
            device_type: "Hub2".to_owned(),
            version: "1.0".to_owned(),
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["timestamp"], "2024-06-01T00:00:00.000000");
        assert!(json["humidity"].is_null());

        let back: Reading = serde_json::from_value(json).unwrap();
        assert_eq!(back, reading);
    }
}
