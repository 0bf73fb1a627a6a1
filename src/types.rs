use crate::constants::{ALL_DAY_END, ALL_DAY_START, UNKNOWN_DATE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Extraction strategy a source is handled with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    General,
    Venue,
    Athletics,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::General => "general",
            SourceKind::Venue => "venue",
            SourceKind::Athletics => "athletics",
        };
        f.pad(name)
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(SourceKind::General),
            "venue" => Ok(SourceKind::Venue),
            "athletics" => Ok(SourceKind::Athletics),
            other => Err(format!(
                "unknown source kind '{}' (expected general, venue or athletics)",
                other
            )),
        }
    }
}

/// Static configuration for one source, loaded once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub kind: SourceKind,
    pub urls: Vec<String>,
    /// Detail pages need a browser to execute scripts before reading
    #[serde(default)]
    pub rendered: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub home_team: Option<String>,
    /// Assumed running time of a venue show when only a start time is published
    #[serde(default)]
    pub show_hours: Option<i64>,
}

/// Ticket cost. Sources disagree between numbers and free-text copy, so both are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cost {
    Amount(f64),
    Text(String),
}

impl Default for Cost {
    fn default() -> Self {
        Cost::Amount(0.0)
    }
}

impl Cost {
    /// Reads "$12.50", "12", "Free" as amounts; anything else is kept verbatim.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("free") {
            return Cost::Amount(0.0);
        }
        let numeric = trimmed.trim_start_matches('$').replace(',', "");
        match numeric.parse::<f64>() {
            Ok(amount) if amount.is_finite() => Cost::Amount(amount),
            _ => Cost::Text(trimmed.to_string()),
        }
    }

    fn trimmed(self) -> Self {
        match self {
            Cost::Text(text) => Cost::Text(text.trim().to_string()),
            amount => amount,
        }
    }
}

/// Canonical event produced by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Natural de-duplication key of the source item
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub host: String,
    pub tag: String,
    #[serde(default)]
    pub cost: Cost,
    pub start_date: String,
    pub end_date: String,
    pub start_time: String,
    pub end_time: String,
    pub event_link: String,
}

impl Event {
    /// Trims leading and trailing whitespace from every text field.
    pub fn trimmed(self) -> Self {
        fn t(s: String) -> String {
            s.trim().to_string()
        }
        Self {
            id: t(self.id),
            title: t(self.title),
            description: t(self.description),
            location: t(self.location),
            host: t(self.host),
            tag: t(self.tag),
            cost: self.cost.trimmed(),
            start_date: t(self.start_date),
            end_date: t(self.end_date),
            start_time: t(self.start_time),
            end_time: t(self.end_time),
            event_link: t(self.event_link),
        }
    }
}

/// Normalized date/time fields of one event. Dates are display strings
/// ("March 3, 2025" or the unknown sentinel); times are 12-hour clock strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start_date: String,
    pub end_date: String,
    pub start_time: String,
    pub end_time: String,
}

impl Schedule {
    pub fn all_day(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
            start_time: ALL_DAY_START.to_string(),
            end_time: ALL_DAY_END.to_string(),
        }
    }

    /// Nothing parsable: unknown dates on both ends, all-day times.
    pub fn unknown() -> Self {
        Self::all_day(UNKNOWN_DATE, UNKNOWN_DATE)
    }
}

/// Fields read from one general-calendar detail page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneralFields {
    pub event_link: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Detail-list values keyed by lower-cased, underscore-joined labels
    pub details: BTreeMap<String, String>,
}

/// Fields read from one rendered venue page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VenueFields {
    pub event_link: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    pub year: Option<String>,
    pub start_time: Option<String>,
    pub price: Option<String>,
}

/// Fields read from one athletics schedule row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AthleticsFields {
    pub event_link: String,
    pub sport: String,
    pub opponent: Option<String>,
    pub date_token: Option<String>,
    pub time_token: Option<String>,
    pub location_parts: Vec<String>,
}

/// Loosely-typed extraction output, one variant per source markup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldBag {
    General(GeneralFields),
    Venue(VenueFields),
    Athletics(AthleticsFields),
}

impl FieldBag {
    pub fn kind(&self) -> SourceKind {
        match self {
            FieldBag::General(_) => SourceKind::General,
            FieldBag::Venue(_) => SourceKind::Venue,
            FieldBag::Athletics(_) => SourceKind::Athletics,
        }
    }

    pub fn event_link(&self) -> &str {
        match self {
            FieldBag::General(f) => &f.event_link,
            FieldBag::Venue(f) => &f.event_link,
            FieldBag::Athletics(f) => &f.event_link,
        }
    }
}

/// How a source's pass ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Completed,
    Failed { reason: String },
    Cancelled,
}

/// Per-source outcome recorded in the run result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub name: String,
    pub kind: SourceKind,
    pub status: SourceStatus,
    /// Sequence ids this source's events were assigned at merge
    pub ids: Range<u64>,
    pub skipped: Vec<String>,
}

impl SourceReport {
    pub fn event_count(&self) -> usize {
        (self.ids.end - self.ids.start) as usize
    }
}

/// Sole output artifact of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub events: BTreeMap<u64, Event>,
    pub count: usize,
    pub completed_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl RunResult {
    /// Human-readable audit line written once per run.
    pub fn summary_line(&self) -> String {
        format!(
            "Scraped a total of {} events; last scraped at: {} UTC",
            self.count,
            self.completed_at.format("%Y-%m-%d %H:%M:%S")
        )
    }

    pub fn failed_sources(&self) -> BTreeSet<&str> {
        self.sources
            .iter()
            .filter(|s| s.status != SourceStatus::Completed)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Events belonging to one source, keyed by their sequence id.
    pub fn events_for(&self, source_name: &str) -> BTreeMap<u64, &Event> {
        self.sources
            .iter()
            .filter(|s| s.name == source_name)
            .flat_map(|s| s.ids.clone())
            .filter_map(|id| self.events.get(&id).map(|e| (id, e)))
            .collect()
    }
}
