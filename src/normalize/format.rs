//! Renders display date/time pairs as date-times at the fixed publication offset.

use crate::constants::PUBLISH_OFFSET_SECS;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

const DATE_FORMATS: [&str; 3] = ["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d"];
// 24-hour first, 12-hour as the fallback
const TIME_FORMATS: [&str; 3] = ["%H:%M", "%H:%M:%S", "%I:%M %p"];

pub fn publish_offset() -> Option<FixedOffset> {
    FixedOffset::east_opt(PUBLISH_OFFSET_SECS)
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim().replace('.', "");
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim().to_uppercase();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&text, fmt).ok())
}

/// Combines a display date and time into a date-time at -06:00.
/// `None` when either half does not parse (e.g. the unknown-date sentinel).
pub fn offset_datetime(date: &str, time: &str) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::new(parse_date(date)?, parse_time(time)?);
    publish_offset()?.from_local_datetime(&naive).single()
}

/// RFC 3339 rendering of [`offset_datetime`].
pub fn offset_string(date: &str, time: &str) -> Option<String> {
    offset_datetime(date, time).map(|dt| dt.to_rfc3339())
}
