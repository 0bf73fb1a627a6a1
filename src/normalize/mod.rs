//! Date/time normalization. Free-text schedules go through ordered regex
//! rules; venue and athletics pages hand over positional tokens that are
//! parsed directly and padded with fixed durations.

pub mod format;

use crate::constants::{
    ALL_DAY_END, ALL_DAY_START, FOOTBALL_DEFAULT_END, FOOTBALL_DEFAULT_START, GAME_DEFAULT_END,
    GAME_DEFAULT_START, GAME_HOURS, UNKNOWN_DATE,
};
use crate::error::NormalizationError;
use crate::types::Schedule;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

pub(crate) const DISPLAY_DATE_FORMAT: &str = "%B %-d, %Y";
pub(crate) const DISPLAY_TIME_FORMAT: &str = "%-I:%M %p";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    Am,
    Pm,
}

/// Start and end meridiems implied by the "am"/"pm" markers in a text.
///
/// Only "pm" present: both PM ("7-9pm"). Only "am" present: both AM.
/// Neither or both: AM for the start, PM for the end.
pub fn infer_meridiems(text: &str) -> (Meridiem, Meridiem) {
    // Only markers right after a number count, so "Campus" or "Program" are not read as times.
    static MARKER_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\d\s*([ap])\.?\s?m\b").expect("valid meridiem regex"));

    let mut am = false;
    let mut pm = false;
    for caps in MARKER_RE.captures_iter(text) {
        if caps[1].eq_ignore_ascii_case("p") {
            pm = true;
        } else {
            am = true;
        }
    }
    match (am, pm) {
        (false, true) => (Meridiem::Pm, Meridiem::Pm),
        (true, false) => (Meridiem::Am, Meridiem::Am),
        _ => (Meridiem::Am, Meridiem::Pm),
    }
}

/// Parses an "H:MM" clock token. Hours 13-23 are read as 24-hour time and
/// the meridiem is ignored.
pub fn clock_time(token: &str, meridiem: Meridiem) -> Result<NaiveTime, NormalizationError> {
    let unparsable = || NormalizationError::UnparsableTime(token.to_string());
    let (hour, minute) = token.trim().split_once(':').ok_or_else(unparsable)?;
    let hour: u32 = hour.trim().parse().map_err(|_| unparsable())?;
    let minute: u32 = minute.trim().parse().map_err(|_| unparsable())?;

    let hour = match (hour, meridiem) {
        (0 | 13..=23, _) => hour,
        (1..=12, Meridiem::Am) => hour % 12,
        (1..=12, Meridiem::Pm) => hour % 12 + 12,
        _ => return Err(unparsable()),
    };
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(unparsable)
}

/// Reads a published start time such as "7:30 PM", "7 p.m." or "19:30".
pub fn parse_start_time(text: &str) -> Result<NaiveTime, NormalizationError> {
    static TWELVE_HOUR_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?\s*m\b").expect("valid clock regex")
    });
    static TWENTY_FOUR_HOUR_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("valid clock regex"));

    if let Some(caps) = TWELVE_HOUR_RE.captures(text) {
        let meridiem = if caps[3].eq_ignore_ascii_case("p") {
            Meridiem::Pm
        } else {
            Meridiem::Am
        };
        let minute = caps.get(2).map_or("00", |m| m.as_str());
        return clock_time(&format!("{}:{}", &caps[1], minute), meridiem);
    }
    if let Some(caps) = TWENTY_FOUR_HOUR_RE.captures(text) {
        let hour: u32 = caps[1].parse().unwrap_or(u32::MAX);
        let minute: u32 = caps[2].parse().unwrap_or(u32::MAX);
        return NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| NormalizationError::UnparsableTime(text.to_string()));
    }
    Err(NormalizationError::UnparsableTime(text.to_string()))
}

pub fn display_time(time: NaiveTime) -> String {
    time.format(DISPLAY_TIME_FORMAT).to_string()
}

pub fn display_date(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

/// `start + hours`, held at 11:59 PM when the addition would roll into the next day.
pub fn end_after(start: NaiveTime, hours: i64) -> NaiveTime {
    let (end, wrapped) = start.overflowing_add_signed(Duration::hours(hours));
    if wrapped != 0 || end < start {
        NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(end)
    } else {
        end
    }
}

/// "Mar", "March", "Sept." -> month number
fn month_number(text: &str) -> Option<u32> {
    let abbrev: String = text.chars().filter(|c| c.is_ascii_alphabetic()).take(3).collect();
    NaiveDate::parse_from_str(&format!("{} 1 2000", abbrev), "%b %d %Y")
        .ok()
        .map(|d| d.month())
}

type DateHandler = fn(&Captures<'_>) -> (String, String);
type TimeHandler = fn(&Captures<'_>, Meridiem, Meridiem) -> Result<(NaiveTime, NaiveTime), NormalizationError>;

struct DateRule {
    name: &'static str,
    pattern: Regex,
    handler: DateHandler,
}

struct TimeRule {
    name: &'static str,
    pattern: Regex,
    handler: TimeHandler,
}

fn rule_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid schedule regex")
}

/// Evaluated in order; the first matching pattern wins.
static DATE_RULES: Lazy<Vec<DateRule>> = Lazy::new(|| {
    vec![
        DateRule {
            name: "date range",
            pattern: rule_regex(
                r"([A-Za-z]+\.? \d{1,2}, \d{4})\s*[-–]\s*([A-Za-z]+\.? \d{1,2}, \d{4})",
            ),
            handler: |caps| (caps[1].to_string(), caps[2].to_string()),
        },
        DateRule {
            name: "day range within a month",
            pattern: rule_regex(r"([A-Za-z]+\.?) (\d{1,2})\s*[-–]\s*(\d{1,2}), (\d{4})"),
            handler: |caps| {
                (
                    format!("{} {}, {}", &caps[1], &caps[2], &caps[4]),
                    format!("{} {}, {}", &caps[1], &caps[3], &caps[4]),
                )
            },
        },
        DateRule {
            name: "single date",
            pattern: rule_regex(r"([A-Za-z]+\.? \d{1,2}, \d{4})"),
            handler: |caps| (caps[1].to_string(), caps[1].to_string()),
        },
    ]
});

static TIME_RULES: Lazy<Vec<TimeRule>> = Lazy::new(|| {
    vec![
        TimeRule {
            name: "time range",
            pattern: rule_regex(r"(\d{1,2}:\d{2})[A-Za-z.\s]*[-–][A-Za-z.\s]*?(\d{1,2}:\d{2})"),
            handler: |caps, start, end| Ok((clock_time(&caps[1], start)?, clock_time(&caps[2], end)?)),
        },
        TimeRule {
            name: "single time",
            pattern: rule_regex(r"(\d{1,2}:\d{2})"),
            handler: |caps, start, end| Ok((clock_time(&caps[1], start)?, clock_time(&caps[1], end)?)),
        },
    ]
});

static ATHLETICS_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z]+)\.? (\d{1,2})").expect("valid athletics date regex"));

/// Applies the free-text rules and positional regimes. Holds the reference
/// date used to infer years for schedule tokens that omit them.
#[derive(Debug, Clone)]
pub struct DateTimeNormalizer {
    reference: NaiveDate,
}

impl Default for DateTimeNormalizer {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

impl DateTimeNormalizer {
    pub fn new(reference: NaiveDate) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    /// General-calendar regime: one string that may hold a date range and a
    /// time range together.
    pub fn normalize_free_text(&self, text: &str) -> Schedule {
        let (start_date, end_date) = self.free_text_dates(text);
        let (start_time, end_time) = match self.free_text_times(text) {
            Ok(Some((start, end))) => (display_time(start), display_time(end)),
            Ok(None) => return Schedule::all_day(start_date, end_date),
            Err(e) => {
                debug!("{}; using the all-day range", e);
                return Schedule::all_day(start_date, end_date);
            }
        };
        Schedule {
            start_date,
            end_date,
            start_time,
            end_time,
        }
    }

    fn free_text_dates(&self, text: &str) -> (String, String) {
        DATE_RULES
            .iter()
            .find_map(|rule| {
                rule.pattern.captures(text).map(|caps| {
                    debug!("Date rule '{}' matched `{}`", rule.name, &caps[0]);
                    (rule.handler)(&caps)
                })
            })
            .unwrap_or_else(|| (UNKNOWN_DATE.to_string(), UNKNOWN_DATE.to_string()))
    }

    fn free_text_times(&self, text: &str) -> Result<Option<(NaiveTime, NaiveTime)>, NormalizationError> {
        let (start_meridiem, end_meridiem) = infer_meridiems(text);
        for rule in TIME_RULES.iter() {
            if let Some(caps) = rule.pattern.captures(text) {
                debug!("Time rule '{}' matched `{}`", rule.name, &caps[0]);
                return (rule.handler)(&caps, start_meridiem, end_meridiem).map(Some);
            }
        }
        Ok(None)
    }

    /// Venue regime: date parts from separate sidebar spans, a published start
    /// time, and an assumed show length.
    pub fn normalize_venue(
        &self,
        month: Option<&str>,
        day: Option<&str>,
        year: Option<&str>,
        start_time: Option<&str>,
        show_hours: i64,
    ) -> Schedule {
        let date = match self.venue_date(month, day, year) {
            Ok(date) => display_date(date),
            Err(e) => {
                debug!("{}; venue date left unknown", e);
                return Schedule::unknown();
            }
        };

        match start_time.map(parse_start_time) {
            Some(Ok(start)) => Schedule {
                start_date: date.clone(),
                end_date: date,
                start_time: display_time(start),
                end_time: display_time(end_after(start, show_hours)),
            },
            Some(Err(e)) => {
                debug!("{}; venue show treated as all-day", e);
                Schedule::all_day(date.clone(), date)
            }
            None => Schedule::all_day(date.clone(), date),
        }
    }

    fn venue_date(
        &self,
        month: Option<&str>,
        day: Option<&str>,
        year: Option<&str>,
    ) -> Result<NaiveDate, NormalizationError> {
        let described = format!(
            "{} {} {}",
            month.unwrap_or_default(),
            day.unwrap_or_default(),
            year.unwrap_or_default()
        );
        let unparsable = || NormalizationError::UnparsableDate(described.trim().to_string());

        let month = month.and_then(month_number).ok_or_else(unparsable)?;
        let day: u32 = day
            .map(digits)
            .and_then(|d| d.parse().ok())
            .ok_or_else(unparsable)?;
        let year: i32 = match year.map(digits).filter(|y| !y.is_empty()) {
            Some(y) => y.parse().map_err(|_| unparsable())?,
            None => self.reference.year(),
        };
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(unparsable)
    }

    /// Athletics regime: a compact "Sep 6 (Sat)" date token without a year,
    /// an optional "6:30 PM CT" time token, and sport-specific default windows.
    pub fn normalize_athletics(
        &self,
        date_token: Option<&str>,
        time_token: Option<&str>,
        sport: &str,
    ) -> Schedule {
        let (start_date, end_date) = match date_token.map(|t| self.athletics_date(t)) {
            Some(Ok(date)) => (display_date(date), display_date(date)),
            Some(Err(e)) => {
                debug!("{}; game date left unknown", e);
                (UNKNOWN_DATE.to_string(), UNKNOWN_DATE.to_string())
            }
            None => (UNKNOWN_DATE.to_string(), UNKNOWN_DATE.to_string()),
        };

        let parsed = time_token
            .ok_or_else(|| NormalizationError::UnparsableTime(String::new()))
            .and_then(parse_start_time);
        let (start_time, end_time) = match parsed {
            Ok(start) => (display_time(start), display_time(end_after(start, GAME_HOURS))),
            Err(_) if sport.to_lowercase().contains("football") => {
                (FOOTBALL_DEFAULT_START.to_string(), FOOTBALL_DEFAULT_END.to_string())
            }
            Err(_) => (GAME_DEFAULT_START.to_string(), GAME_DEFAULT_END.to_string()),
        };

        Schedule {
            start_date,
            end_date,
            start_time,
            end_time,
        }
    }

    /// January through July belong to the year after the reference year:
    /// schedules are published in the fall for a season that spans the new year.
    fn athletics_date(&self, token: &str) -> Result<NaiveDate, NormalizationError> {
        let unparsable = || NormalizationError::UnparsableDate(token.to_string());
        let caps = ATHLETICS_DATE_RE.captures(token).ok_or_else(unparsable)?;
        let month = month_number(&caps[1]).ok_or_else(unparsable)?;
        let day: u32 = caps[2].parse().map_err(|_| unparsable())?;
        let year = if month <= 7 {
            self.reference.year() + 1
        } else {
            self.reference.year()
        };
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(unparsable)
    }
}

fn digits(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// True for the 12:00 AM - 11:59 PM default pairing.
pub fn is_all_day(schedule: &Schedule) -> bool {
    schedule.end_time == ALL_DAY_END && schedule.start_time == ALL_DAY_START
}

/// Minutes since midnight of a displayed time, for ordering checks.
pub fn minutes_of(display: &str) -> Option<u32> {
    NaiveTime::parse_from_str(display, DISPLAY_TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(display, "%I:%M %p"))
        .ok()
        .map(|t| t.hour() * 60 + t.minute())
}
