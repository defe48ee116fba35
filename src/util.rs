use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::ParseError;

/// Encodes a timestamp the way it is stored in the database.
/// The output is fixed-width (microseconds, `Z` suffix), so comparing two
/// encoded timestamps as strings gives the same result as comparing the timestamps.
pub fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Whether `encode_timestamp` gives the fixed-width form for `value`.
/// Years outside 0..=9999 get a sign and extra digits, which breaks the ordering.
pub fn is_storable(value: DateTime<Utc>) -> bool {
    (0..=9999).contains(&value.year())
}

pub fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

/// Parses a timestamp typed into the admin form.
/// Accepts RFC 3339, or `YYYY-MM-DDTHH:MM[:SS]` (what `<input type="datetime-local">` sends)
/// which is taken as UTC.
pub fn parse_form_timestamp(value: &str) -> Result<DateTime<Utc>, ParseError> {
    let value = value.trim();
    let parsed = decode_timestamp(value).ok().or_else(|| {
        ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    });
    parsed
        .filter(|dt| is_storable(*dt))
        .ok_or_else(|| ParseError::InvalidTimestamp(value.to_string()))
}
