//! Per-source HTML extraction into field bags.

pub mod athletics;
pub mod general;
pub mod venue;

pub use athletics::AthleticsExtractor;
pub use general::GeneralCalendarExtractor;
pub use venue::VenueExtractor;

use crate::error::ExtractionError;
use crate::types::{FieldBag, SourceKind};
use reqwest::Url;
use scraper::{ElementRef, Selector};

/// Bags read from one page plus the reasons any candidate items were dropped
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extraction {
    pub bags: Vec<FieldBag>,
    pub skipped: Vec<String>,
}

impl Extraction {
    pub fn single(bag: FieldBag) -> Self {
        Self {
            bags: vec![bag],
            skipped: Vec::new(),
        }
    }
}

/// Markup-specific reader for one kind of source
pub trait Extractor: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Whether listing pages point at detail pages that must be fetched and extracted
    fn follows_links(&self) -> bool {
        true
    }

    /// Detail-page URLs advertised on a listing page, in page order.
    fn listing_links(&self, _html: &str, _page_url: &str) -> Result<Vec<String>, ExtractionError> {
        Ok(Vec::new())
    }

    /// Parses one fetched page. A broken item is recorded in `skipped` and its
    /// siblings are still returned.
    fn extract(&self, html: &str, source_url: &str) -> Result<Extraction, ExtractionError>;
}

pub fn extractor_for(kind: SourceKind) -> Box<dyn Extractor> {
    match kind {
        SourceKind::General => Box::new(GeneralCalendarExtractor::new()),
        SourceKind::Venue => Box::new(VenueExtractor::new()),
        SourceKind::Athletics => Box::new(AthleticsExtractor::new()),
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|_| ExtractionError::Selector(css.to_string()))
}

/// All descendant text of an element, untrimmed.
pub(crate) fn raw_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Trimmed text, `None` when blank.
pub(crate) fn text_of(element: ElementRef<'_>) -> Option<String> {
    let text = raw_text(element).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub(crate) fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope.select(sel).next().and_then(text_of)
}

/// "Event Type" -> "event_type"
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

/// Resolves an href against the page it was found on.
pub(crate) fn resolve_link(page_url: &str, href: &str) -> Result<String, ExtractionError> {
    let base = Url::parse(page_url).map_err(|_| ExtractionError::MissingField {
        field: "page url".to_string(),
        url: page_url.to_string(),
    })?;
    base.join(href.trim())
        .map(String::from)
        .map_err(|_| ExtractionError::MissingField {
            field: format!("href `{}`", href),
            url: page_url.to_string(),
        })
}

/// Resolves an href against the site root, the way the calendar CMS builds detail links.
pub(crate) fn resolve_from_root(page_url: &str, href: &str) -> Result<String, ExtractionError> {
    let root = resolve_link(page_url, "/")?;
    resolve_link(&root, href.trim().trim_start_matches("./"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_lowercased_and_underscored() {
        assert_eq!(normalize_label(" Event Type "), "event_type");
        assert_eq!(normalize_label("Sponsor"), "sponsor");
    }

    #[test]
    fn root_resolution_ignores_listing_path() {
        let link = resolve_from_root(
            "https://calendars.illinois.edu/list/7",
            "detail/7?eventId=33405101",
        )
        .unwrap();
        assert_eq!(link, "https://calendars.illinois.edu/detail/7?eventId=33405101");

        let absolute = resolve_from_root(
            "https://calendars.illinois.edu/list/7",
            "https://other.example/detail/1",
        )
        .unwrap();
        assert_eq!(absolute, "https://other.example/detail/1");
    }

    #[test]
    fn page_relative_resolution() {
        let link = resolve_link("https://venue.example/events/all", "/events/detail/show-1").unwrap();
        assert_eq!(link, "https://venue.example/events/detail/show-1");
    }
}
