//! Shared helpers, chiefly timestamp normalization at the data-access
//! boundary. Legacy exports mixed RFC 3339 strings, bare dates, epoch
//! numbers, and `{seconds, nanos}` objects; everything is canonicalized to
//! `DateTime<Utc>` the moment it enters the system.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

/// Epoch values at or above this are treated as milliseconds.
const EPOCH_MILLIS_CUTOFF: i64 = 100_000_000_000;

/// Normalizes any of the historically observed timestamp encodings to a
/// canonical `DateTime<Utc>`. Returns `None` for unrecognized shapes.
pub fn normalize_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_datetime_str(s),
        Value::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            from_epoch(raw)
        }
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))?
                .as_i64()?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos as u32).single()
        }
        _ => None,
    }
}

fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(23, 59, 59).map(|ndt| Utc.from_utc_datetime(&ndt));
    }
    None
}

fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    if raw >= EPOCH_MILLIS_CUTOFF {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

/// Serde adapter accepting any supported timestamp encoding on input while
/// always serializing RFC 3339.
pub mod flexible_ts {
    use super::*;
    use serde::{de::Error as DeError, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let value = Value::deserialize(de)?;
        normalize_timestamp(&value)
            .ok_or_else(|| DeError::custom(format!("unrecognized timestamp: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rfc3339_strings_normalize() {
        let dt = normalize_timestamp(&json!("2025-11-02T10:30:00Z")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-11-02T10:30:00+00:00");
    }

    #[test]
    fn bare_dates_normalize_to_end_of_day() {
        let dt = normalize_timestamp(&json!("2025-11-02")).unwrap();
        assert_eq!(dt.format("%H:%M:%S").to_string(), "23:59:59");
    }

    #[test]
    fn epoch_seconds_and_millis_are_distinguished() {
        let secs = normalize_timestamp(&json!(1_730_540_000)).unwrap();
        let millis = normalize_timestamp(&json!(1_730_540_000_000i64)).unwrap();
        assert_eq!(secs, millis);
    }

    #[test]
    fn seconds_nanos_objects_normalize() {
        let dt = normalize_timestamp(&json!({"seconds": 1_730_540_000, "nanoseconds": 0})).unwrap();
        assert_eq!(dt.timestamp(), 1_730_540_000);

        let underscored = normalize_timestamp(&json!({"_seconds": 1_730_540_000})).unwrap();
        assert_eq!(underscored, dt);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(normalize_timestamp(&json!("next tuesday")).is_none());
        assert!(normalize_timestamp(&json!(null)).is_none());
        assert!(normalize_timestamp(&json!([1, 2])).is_none());
    }
}
