//! Field bag -> canonical event mapping, in-source de-duplication and the
//! final merge of per-source batches into one run result.

use crate::constants::{
    ATHLETICS_HOME_TEAM, ATHLETICS_HOST, ATHLETICS_TAG, GENERAL_EVENT_ID_PARAM, NO_DESCRIPTION,
    STATE_FARM_HOST, STATE_FARM_LOCATION, STATE_FARM_TAG, UNKNOWN_TITLE, VENUE_SHOW_HOURS,
};
use crate::error::AssemblyError;
use crate::normalize::DateTimeNormalizer;
use crate::types::{
    AthleticsFields, Cost, Event, FieldBag, GeneralFields, RunResult, SourceDescriptor, SourceKind,
    SourceReport, SourceStatus, VenueFields,
};
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Natural key of a general-calendar detail link: its `eventId` query
/// parameter, or the whole link when there is none.
pub fn general_key(link: &str) -> String {
    Url::parse(link.trim())
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == GENERAL_EVENT_ID_PARAM)
                .map(|(_, v)| v.trim().to_string())
        })
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| link.trim().to_string())
}

/// Every athletics row shares the schedule link, so the game itself is part of the key.
pub fn athletics_key(fields: &AthleticsFields) -> String {
    format!(
        "{}#{}|{}",
        fields.event_link.trim(),
        fields.date_token.as_deref().unwrap_or_default().trim(),
        fields.opponent.as_deref().unwrap_or_default().trim()
    )
}

/// Key of a detail link found on a listing page, used to skip repeats before fetching.
pub fn link_key(kind: SourceKind, link: &str) -> String {
    match kind {
        SourceKind::General => general_key(link),
        _ => link.trim().to_string(),
    }
}

pub fn natural_key(bag: &FieldBag) -> String {
    match bag {
        FieldBag::General(f) => general_key(&f.event_link),
        FieldBag::Venue(f) => f.event_link.trim().to_string(),
        FieldBag::Athletics(f) => athletics_key(f),
    }
}

/// Events of one source after de-duplication, before sequence ids exist.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    pub name: String,
    pub kind: SourceKind,
    pub status: SourceStatus,
    pub events: Vec<Event>,
    pub skipped: Vec<String>,
}

impl SourceBatch {
    pub fn failed(descriptor: &SourceDescriptor, reason: impl Into<String>) -> Self {
        Self {
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            status: SourceStatus::Failed {
                reason: reason.into(),
            },
            events: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn cancelled(descriptor: &SourceDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            status: SourceStatus::Cancelled,
            events: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Per-source accumulator. The first bag seen for a natural key wins.
#[derive(Debug)]
pub struct Assembler {
    descriptor: SourceDescriptor,
    normalizer: DateTimeNormalizer,
    seen: HashSet<String>,
    events: Vec<Event>,
    skipped: Vec<String>,
}

impl Assembler {
    pub fn new(descriptor: SourceDescriptor, normalizer: DateTimeNormalizer) -> Self {
        Self {
            descriptor,
            normalizer,
            seen: HashSet::new(),
            events: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn record_skip(&mut self, reason: impl Into<String>) {
        self.skipped.push(reason.into());
    }

    /// Maps and keeps one bag. Returns `Ok(false)` for a duplicate key.
    pub fn push(&mut self, bag: FieldBag) -> Result<bool, AssemblyError> {
        if bag.event_link().trim().is_empty() {
            return Err(AssemblyError::MissingLink {
                source_name: self.descriptor.name.clone(),
            });
        }

        let key = natural_key(&bag);
        if !self.seen.insert(key.clone()) {
            debug!("[{}] duplicate item {} skipped", self.descriptor.name, key);
            return Ok(false);
        }

        let event = self.adapt(bag, key).trimmed();
        self.events.push(event);
        Ok(true)
    }

    /// Adds every bag, logging and recording the ones that cannot be mapped.
    pub fn extend(&mut self, bags: impl IntoIterator<Item = FieldBag>) {
        for bag in bags {
            if let Err(e) = self.push(bag) {
                warn!("[{}] item skipped: {}", self.descriptor.name, e);
                self.skipped.push(e.to_string());
            }
        }
    }

    pub fn finish(self) -> SourceBatch {
        SourceBatch {
            name: self.descriptor.name,
            kind: self.descriptor.kind,
            status: SourceStatus::Completed,
            events: self.events,
            skipped: self.skipped,
        }
    }

    fn adapt(&self, bag: FieldBag, key: String) -> Event {
        match bag {
            FieldBag::General(fields) => self.adapt_general(fields, key),
            FieldBag::Venue(fields) => self.adapt_venue(fields, key),
            FieldBag::Athletics(fields) => self.adapt_athletics(fields, key),
        }
    }

    fn default_or(&self, configured: &Option<String>, fallback: &str) -> String {
        configured.clone().unwrap_or_else(|| fallback.to_string())
    }

    fn adapt_general(&self, fields: GeneralFields, key: String) -> Event {
        let GeneralFields {
            event_link,
            title,
            description,
            details,
        } = fields;
        let detail = |label: &str| details.get(label).map(|v| v.trim().to_string());
        let schedule = self
            .normalizer
            .normalize_free_text(details.get("date").map(String::as_str).unwrap_or_default());

        Event {
            id: key,
            title: non_blank(title).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            description: description.unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            location: detail("location")
                .unwrap_or_else(|| self.default_or(&self.descriptor.location, "")),
            host: detail("sponsor").unwrap_or_else(|| self.default_or(&self.descriptor.host, "")),
            tag: detail("event_type").unwrap_or_else(|| self.default_or(&self.descriptor.tag, "")),
            cost: detail("cost")
                .or_else(|| detail("price"))
                .map(|c| Cost::from_text(&c))
                .unwrap_or_default(),
            start_date: schedule.start_date,
            end_date: schedule.end_date,
            start_time: schedule.start_time,
            end_time: schedule.end_time,
            event_link,
        }
    }

    fn adapt_venue(&self, fields: VenueFields, key: String) -> Event {
        let schedule = self.normalizer.normalize_venue(
            fields.month.as_deref(),
            fields.day.as_deref(),
            fields.year.as_deref(),
            fields.start_time.as_deref(),
            self.descriptor.show_hours.unwrap_or(VENUE_SHOW_HOURS),
        );

        Event {
            id: key,
            title: non_blank(fields.title).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            description: fields.description.unwrap_or_default(),
            location: self.default_or(&self.descriptor.location, STATE_FARM_LOCATION),
            host: self.default_or(&self.descriptor.host, STATE_FARM_HOST),
            tag: self.default_or(&self.descriptor.tag, STATE_FARM_TAG),
            cost: fields.price.map(|p| Cost::from_text(&p)).unwrap_or_default(),
            start_date: schedule.start_date,
            end_date: schedule.end_date,
            start_time: schedule.start_time,
            end_time: schedule.end_time,
            event_link: fields.event_link,
        }
    }

    fn adapt_athletics(&self, fields: AthleticsFields, key: String) -> Event {
        let schedule = self.normalizer.normalize_athletics(
            fields.date_token.as_deref(),
            fields.time_token.as_deref(),
            &fields.sport,
        );
        let home_team = self.default_or(&self.descriptor.home_team, ATHLETICS_HOME_TEAM);
        let opponent = fields.opponent.unwrap_or_default();
        // The page lists the city first, then the venue.
        let location = match fields.location_parts.as_slice() {
            [city, venue] => format!("{}, {}", venue, city),
            _ => fields.location_parts.join(", "),
        };

        Event {
            id: key,
            title: format!("{} Game: {} VS. {}", fields.sport, home_team, opponent.trim()),
            description: String::new(),
            location: if location.is_empty() {
                self.default_or(&self.descriptor.location, "")
            } else {
                location
            },
            host: self.default_or(&self.descriptor.host, ATHLETICS_HOST),
            tag: self.default_or(&self.descriptor.tag, ATHLETICS_TAG),
            cost: Cost::default(),
            start_date: schedule.start_date,
            end_date: schedule.end_date,
            start_time: schedule.start_time,
            end_time: schedule.end_time,
            event_link: fields.event_link,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Unions the batches in the given order and assigns sequence ids from 0.
/// Failed and cancelled sources contribute a report but no events.
pub fn merge(batches: Vec<SourceBatch>, completed_at: DateTime<Utc>) -> RunResult {
    let mut events = BTreeMap::new();
    let mut sources = Vec::with_capacity(batches.len());
    let mut next_id: u64 = 0;

    for batch in batches {
        let start = next_id;
        if batch.status == SourceStatus::Completed {
            for event in batch.events {
                events.insert(next_id, event);
                next_id += 1;
            }
        }
        info!(
            "Source {} ({}) contributed {} events",
            batch.name,
            batch.kind,
            next_id - start
        );
        sources.push(SourceReport {
            name: batch.name,
            kind: batch.kind,
            status: batch.status,
            ids: start..next_id,
            skipped: batch.skipped,
        });
    }

    RunResult {
        count: events.len(),
        events,
        completed_at,
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ALL_DAY_END, ALL_DAY_START, UNKNOWN_DATE};
    use chrono::NaiveDate;

    fn descriptor(kind: SourceKind) -> SourceDescriptor {
        SourceDescriptor {
            name: format!("{}_test", kind),
            kind,
            urls: vec!["https://example.edu/list".to_string()],
            rendered: kind == SourceKind::Venue,
            location: None,
            tag: None,
            host: None,
            home_team: None,
            show_hours: None,
        }
    }

    fn assembler(kind: SourceKind) -> Assembler {
        Assembler::new(
            descriptor(kind),
            DateTimeNormalizer::new(NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()),
        )
    }

    fn general_bag(link: &str) -> FieldBag {
        let mut details = BTreeMap::new();
        details.insert("date".to_string(), "March 3, 2025 7:00-9:00 pm".to_string());
        details.insert("location".to_string(), " Foellinger Auditorium ".to_string());
        details.insert("event_type".to_string(), "Performance".to_string());
        details.insert("sponsor".to_string(), "School of Music".to_string());
        details.insert("cost".to_string(), "$10".to_string());
        FieldBag::General(GeneralFields {
            event_link: link.to_string(),
            title: Some(" Spring Recital ".to_string()),
            description: Some("\n An evening of music. \n".to_string()),
            details,
        })
    }

    #[test]
    fn identical_keys_yield_one_event() {
        let mut a = assembler(SourceKind::General);
        assert!(a.push(general_bag("https://cal.example/detail/7?eventId=55")).unwrap());
        assert!(!a.push(general_bag("https://cal.example/detail/557?eventId=55")).unwrap());
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn different_keys_yield_two_events() {
        let mut a = assembler(SourceKind::General);
        a.push(general_bag("https://cal.example/detail/7?eventId=55")).unwrap();
        a.push(general_bag("https://cal.example/detail/7?eventId=56")).unwrap();
        assert_eq!(a.finish().events.len(), 2);
    }

    #[test]
    fn general_labels_are_translated_and_trimmed() {
        let mut a = assembler(SourceKind::General);
        a.push(general_bag("https://cal.example/detail/7?eventId=55")).unwrap();
        let event = &a.finish().events[0];

        assert_eq!(event.id, "55");
        assert_eq!(event.title, "Spring Recital");
        assert_eq!(event.description, "An evening of music.");
        assert_eq!(event.location, "Foellinger Auditorium");
        assert_eq!(event.tag, "Performance");
        assert_eq!(event.host, "School of Music");
        assert_eq!(event.cost, Cost::Amount(10.0));
        assert_eq!(event.start_date, "March 3, 2025");
        assert_eq!(event.end_date, "March 3, 2025");
        assert_eq!(event.start_time, "7:00 PM");
        assert_eq!(event.end_time, "9:00 PM");
    }

    #[test]
    fn general_bag_without_details_gets_fallbacks() {
        let mut a = assembler(SourceKind::General);
        a.push(FieldBag::General(GeneralFields {
            event_link: "https://cal.example/detail/7?eventId=9".to_string(),
            ..GeneralFields::default()
        }))
        .unwrap();
        let event = &a.finish().events[0];

        assert_eq!(event.title, UNKNOWN_TITLE);
        assert_eq!(event.description, NO_DESCRIPTION);
        assert_eq!(event.cost, Cost::Amount(0.0));
        assert_eq!(event.start_date, UNKNOWN_DATE);
        assert_eq!(event.end_date, UNKNOWN_DATE);
        assert_eq!(event.start_time, ALL_DAY_START);
        assert_eq!(event.end_time, ALL_DAY_END);
    }

    #[test]
    fn bag_without_link_is_an_assembly_error() {
        let mut a = assembler(SourceKind::Venue);
        let err = a.push(FieldBag::Venue(VenueFields::default())).unwrap_err();
        assert!(matches!(err, AssemblyError::MissingLink { .. }));

        a.extend(vec![FieldBag::Venue(VenueFields::default())]);
        let batch = a.finish();
        assert!(batch.events.is_empty());
        assert_eq!(batch.skipped.len(), 1);
    }

    #[test]
    fn venue_fields_use_hard_coded_classification() {
        let mut a = assembler(SourceKind::Venue);
        a.push(FieldBag::Venue(VenueFields {
            event_link: "https://venue.example/events/detail/show".to_string(),
            title: Some("Comedy Night".to_string()),
            description: Some("Stand-up.".to_string()),
            month: Some("Mar".to_string()),
            day: Some("14".to_string()),
            year: Some(", 2025".to_string()),
            start_time: Some("7:30 PM".to_string()),
            price: None,
        }))
        .unwrap();
        let event = &a.finish().events[0];

        assert_eq!(event.id, "https://venue.example/events/detail/show");
        assert_eq!(event.location, STATE_FARM_LOCATION);
        assert_eq!(event.tag, STATE_FARM_TAG);
        assert_eq!(event.host, STATE_FARM_HOST);
        assert_eq!(event.start_date, "March 14, 2025");
        assert_eq!(event.end_time, "10:30 PM");
    }

    #[test]
    fn athletics_rows_on_one_page_stay_distinct() {
        let mut a = assembler(SourceKind::Athletics);
        let row = |opponent: &str, date: &str| {
            FieldBag::Athletics(AthleticsFields {
                event_link: "https://athletics.example/football/schedule".to_string(),
                sport: "Football".to_string(),
                opponent: Some(opponent.to_string()),
                date_token: Some(date.to_string()),
                time_token: Some("6:30 PM".to_string()),
                location_parts: vec!["Champaign, Ill.".to_string(), "Memorial Stadium".to_string()],
            })
        };
        assert!(a.push(row("Purdue", "Oct 4 (Sat)")).unwrap());
        assert!(a.push(row("Rutgers", "Oct 18 (Sat)")).unwrap());
        assert!(!a.push(row("Purdue", "Oct 4 (Sat)")).unwrap());

        let batch = a.finish();
        assert_eq!(batch.events.len(), 2);
        let first = &batch.events[0];
        assert_eq!(first.title, "Football Game: Illinois VS. Purdue");
        assert_eq!(first.location, "Memorial Stadium, Champaign, Ill.");
        assert_eq!(first.tag, ATHLETICS_TAG);
        assert_eq!(first.host, ATHLETICS_HOST);
        assert_eq!(first.start_date, "October 4, 2025");
    }

    #[test]
    fn merge_renumbers_and_drops_failed_sources() {
        let mut general = assembler(SourceKind::General);
        general.push(general_bag("https://cal.example/detail/7?eventId=1")).unwrap();
        general.push(general_bag("https://cal.example/detail/7?eventId=2")).unwrap();
        let failed = SourceBatch::failed(&descriptor(SourceKind::Venue), "listing unreachable");
        let mut athletics = assembler(SourceKind::Athletics);
        athletics.push(FieldBag::Athletics(AthleticsFields {
            event_link: "https://athletics.example/vb/schedule".to_string(),
            sport: "Volleyball".to_string(),
            opponent: Some("Ohio State".to_string()),
            ..AthleticsFields::default()
        }))
        .unwrap();

        let result = merge(
            vec![general.finish(), failed, athletics.finish()],
            Utc::now(),
        );

        assert_eq!(result.count, 3);
        assert_eq!(result.events.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(result.sources[1].ids, 2..2);
        assert_eq!(result.sources[2].ids, 2..3);
        assert_eq!(result.failed_sources().into_iter().collect::<Vec<_>>(), vec!["venue_test"]);
        assert_eq!(result.events_for("athletics_test").len(), 1);
    }

    #[test]
    fn event_round_trips_through_json() {
        let mut a = assembler(SourceKind::General);
        a.push(general_bag("https://cal.example/detail/7?eventId=55")).unwrap();
        let event = a.finish().events.remove(0);

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn general_key_prefers_event_id() {
        assert_eq!(general_key("https://cal.example/detail/7?eventId=33405101"), "33405101");
        assert_eq!(general_key("https://cal.example/detail/7"), "https://cal.example/detail/7");
    }
}
