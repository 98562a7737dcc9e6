//! Parsing of VistA/VPR timestamps and compound values.
//!
//! VPR documents carry timestamps as ISO strings or as digit runs (`20240119160242`), sometimes
//! as JSON numbers and sometimes with a fractional suffix. Everything is interpreted as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const ISO_NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse a VistA timestamp.
///
/// ISO 8601 forms are tried first. Otherwise any fractional part is dropped and the digits are
/// read by length: 14 `YYYYMMDDHHMMSS`, 12 `YYYYMMDDHHMM`, 10 `YYYYMMDDHH`, 8 `YYYYMMDD`.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ISO_NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }

    let digits = text.split('.').next().unwrap_or_default();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = match digits.len() {
        14 => digits.to_owned(),
        12 => format!("{digits}00"),
        10 => format!("{digits}0000"),
        8 => format!("{digits}000000"),
        _ => return None,
    };
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// [`parse_datetime`] over a JSON value. Strings and numbers are accepted.
pub fn parse_datetime_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_datetime(s),
        Value::Number(n) => parse_datetime(&n.to_string()),
        _ => None,
    }
}

/// Parse a date of birth given as `YYYYMMDD` or ISO.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    parse_datetime(raw).map(|dt| dt.date_naive())
}

pub fn parse_date_value(value: &Value) -> Option<NaiveDate> {
    parse_datetime_value(value).map(|dt| dt.date_naive())
}

/// Today in VistA date form, `YYYYMMDD`.
pub fn today_vista() -> String {
    Utc::now().format("%Y%m%d").to_string()
}

/// Split a blood pressure reading such as `"135/100"` into systolic and diastolic.
pub fn parse_blood_pressure(raw: &str) -> Option<(u32, u32)> {
    let (systolic, diastolic) = raw.trim().split_once('/')?;
    if diastolic.contains('/') {
        return None;
    }
    Some((systolic.trim().parse().ok()?, diastolic.trim().parse().ok()?))
}
