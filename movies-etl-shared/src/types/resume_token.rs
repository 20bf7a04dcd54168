//! Resume token encoding.
//!
//! A resume token is the textual form of a change-tracking timestamp. Tokens are
//! written as RFC 3339 in UTC with microsecond precision, which PostgreSQL accepts
//! back as a `timestamptz` literal. Reading also accepts any RFC 3339 offset and
//! naive ISO-8601 timestamps, which are taken as UTC.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Format a timestamp as a resume token.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use movies_etl_shared::format_resume_token;
///
/// let ts = Utc.with_ymd_and_hms(2021, 6, 16, 20, 14, 9).unwrap();
/// assert_eq!(format_resume_token(ts), "2021-06-16T20:14:09.000000Z");
/// ```
pub fn format_resume_token(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a resume token back into a timestamp.
pub fn parse_resume_token(token: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let token = token.trim();
    match DateTime::parse_from_rfc3339(token) {
        Ok(timestamp) => Ok(timestamp.with_timezone(&Utc)),
        Err(rfc_error) => NaiveDateTime::parse_from_str(token, NAIVE_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_error),
    }
}

/// The closest instant strictly before `timestamp` at source precision (1µs).
pub fn previous_instant(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp - Duration::microseconds(1)
}
