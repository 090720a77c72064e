//! Timestamp decoding shared by sessions and log entries.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Accept milliseconds since epoch (number or numeric string) or RFC 3339.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            // Whole-millisecond floats like 1.7e12 come through as f64.
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
        }
        _ => None,
    }
}

/// Convert milliseconds since epoch to a UTC datetime.
pub fn to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Current time in milliseconds since epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
