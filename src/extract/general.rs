use super::{first_text, normalize_label, raw_text, resolve_from_root, selector, Extraction, Extractor};
use crate::error::ExtractionError;
use crate::types::{FieldBag, GeneralFields, SourceKind};
use tracing::{debug, warn};

/// University calendar CMS: listing pages of `div.title` anchors, detail pages
/// with a `dt`/`dd` label list inside `section.detail-content`.
#[derive(Debug, Default)]
pub struct GeneralCalendarExtractor;

impl GeneralCalendarExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for GeneralCalendarExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::General
    }

    fn listing_links(&self, html: &str, page_url: &str) -> Result<Vec<String>, ExtractionError> {
        let document = scraper::Html::parse_document(html);
        let anchor_selector = selector("div.title a")?;

        let mut links = Vec::new();
        for anchor in document.select(&anchor_selector) {
            let Some(href) = anchor.value().attr("href") else {
                debug!("Listing anchor without href on {}", page_url);
                continue;
            };
            match resolve_from_root(page_url, href) {
                Ok(link) => links.push(link),
                Err(e) => warn!("Skipping listing anchor on {}: {}", page_url, e),
            }
        }
        debug!("Found {} event anchors on {}", links.len(), page_url);
        Ok(links)
    }

    fn extract(&self, html: &str, source_url: &str) -> Result<Extraction, ExtractionError> {
        let document = scraper::Html::parse_document(html);
        let section_selector = selector("section.detail-content")?;
        let title_selector = selector("h2")?;
        let description_selector = selector("dd.ws-description")?;
        let term_selector = selector("dt")?;
        let value_selector = selector("dd")?;

        let mut fields = GeneralFields {
            event_link: source_url.to_string(),
            ..GeneralFields::default()
        };

        let Some(section) = document.select(&section_selector).next() else {
            warn!("No detail section on {}; keeping the event with fallback fields", source_url);
            return Ok(Extraction::single(FieldBag::General(fields)));
        };

        fields.title = first_text(section, &title_selector);
        fields.description = section.select(&description_selector).next().map(raw_text);

        // Blank terms still occupy a slot so every value stays with its own label.
        let terms = section.select(&term_selector).map(|dt| normalize_label(&raw_text(dt)));
        let values = section.select(&value_selector).map(raw_text);
        for (label, value) in terms.zip(values) {
            if label.is_empty() {
                continue;
            }
            // A repeated label keeps its last value.
            fields.details.insert(label, value);
        }

        Ok(Extraction::single(FieldBag::General(fields)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <div class="title"><a href="detail/7?eventId=101">Lecture</a></div>
          <div class="title"><a href="/detail/7?eventId=102">Concert</a></div>
          <div class="title"><span>no link</span></div>
        </body></html>"#;

    const DETAIL: &str = r#"
        <html><body>
          <section class="detail-content">
            <h2> Chemistry Lecture </h2>
            <dl>
              <dt>Date </dt><dd>March 3, 2025&nbsp;&nbsp; 4:00 - 5:00 pm</dd>
              <dt>Location</dt><dd> Noyes Lab 100 </dd>
              <dt>Event Type</dt><dd>Lecture</dd>
              <dt>Sponsor</dt><dd>Department of Chemistry</dd>
              <dt>Cost</dt><dd>Free</dd>
              <dt>Description</dt><dd class="ws-description"> A talk. </dd>
            </dl>
          </section>
        </body></html>"#;

    #[test]
    fn listing_links_resolve_against_site_root() {
        let links = GeneralCalendarExtractor::new()
            .listing_links(LISTING, "https://calendars.illinois.edu/list/7")
            .unwrap();
        assert_eq!(
            links,
            vec![
                "https://calendars.illinois.edu/detail/7?eventId=101",
                "https://calendars.illinois.edu/detail/7?eventId=102",
            ]
        );
    }

    #[test]
    fn detail_reads_label_value_pairs() {
        let url = "https://calendars.illinois.edu/detail/7?eventId=101";
        let extraction = GeneralCalendarExtractor::new().extract(DETAIL, url).unwrap();
        let FieldBag::General(fields) = &extraction.bags[0] else {
            panic!("expected a general bag");
        };

        assert_eq!(fields.event_link, url);
        assert_eq!(fields.title.as_deref(), Some("Chemistry Lecture"));
        assert_eq!(fields.description.as_deref(), Some(" A talk. "));
        assert!(fields.details["date"].contains("4:00 - 5:00 pm"));
        assert_eq!(fields.details["location"], " Noyes Lab 100 ");
        assert_eq!(fields.details["event_type"], "Lecture");
        assert_eq!(fields.details["sponsor"], "Department of Chemistry");
        assert_eq!(fields.details["cost"], "Free");
    }

    #[test]
    fn blank_terms_do_not_shift_later_values() {
        let html = r#"
            <section class="detail-content">
              <h2>Seminar</h2>
              <dl>
                <dt></dt><dd>Speaker: Jane Doe</dd>
                <dt>Date</dt><dd>March 3, 2025 4:00 - 5:00 pm</dd>
                <dt>Location</dt><dd>Altgeld Hall</dd>
                <dt>Location</dt><dd>Room 245</dd>
              </dl>
            </section>"#;
        let extraction = GeneralCalendarExtractor::new()
            .extract(html, "https://c.example/detail/7?eventId=4")
            .unwrap();
        let FieldBag::General(fields) = &extraction.bags[0] else {
            panic!("expected a general bag");
        };

        assert_eq!(fields.details["date"], "March 3, 2025 4:00 - 5:00 pm");
        assert_eq!(fields.details["location"], "Room 245");
        assert!(!fields.details.contains_key(""));
        assert_eq!(fields.details.len(), 2);
    }

    #[test]
    fn missing_section_degrades_instead_of_failing() {
        let extraction = GeneralCalendarExtractor::new()
            .extract("<html><body><p>gone</p></body></html>", "https://c.example/detail/1?eventId=9")
            .unwrap();
        let FieldBag::General(fields) = &extraction.bags[0] else {
            panic!("expected a general bag");
        };
        assert!(fields.title.is_none());
        assert!(fields.details.is_empty());
    }
}
