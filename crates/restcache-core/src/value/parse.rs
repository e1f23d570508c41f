use crate::value::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Parse an ISO-8601 date-time with an explicit offset.
///
/// Accepts RFC 3339 timestamps with optional fractional seconds, and the
/// minute-precision form `YYYY-MM-DDTHH:MM(Z|+hh:mm)`. Dates without an
/// offset stay text.
#[must_use]
pub fn parse_iso_date_time(s: &str) -> Option<OffsetDateTime> {
    // cheap shape gate before handing off to the full parser
    let bytes = s.as_bytes();
    if bytes.len() < 17 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'T' {
        return None;
    }

    if let Ok(date) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(date);
    }

    // minute precision: splice in zero seconds
    if bytes[13] == b':' && matches!(bytes.get(16), Some(b'Z' | b'+' | b'-')) {
        let widened = format!("{}:00{}", &s[..16], &s[16..]);
        return OffsetDateTime::parse(&widened, &Rfc3339).ok();
    }

    None
}

/// Parse one literal from a filter query string.
///
/// Order of attempts: ISO date-time, JSON literal (numbers, booleans, null,
/// arrays, objects, quoted strings), and finally the raw text.
#[must_use]
pub fn parse_value(raw: &str) -> Value {
    if let Some(date) = parse_iso_date_time(raw) {
        return Value::Date(date);
    }

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(&json),
        Err(_) => Value::Text(raw.to_string()),
    }
}
