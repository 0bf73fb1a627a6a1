use super::{first_text, resolve_link, selector, text_of, Extraction, Extractor};
use crate::error::ExtractionError;
use crate::types::{FieldBag, SourceKind, VenueFields};
use scraper::Html;
use tracing::{debug, warn};

/// Arena venue site. The listing is static; detail pages only carry their
/// content after scripts run, so they are read from rendered HTML.
#[derive(Debug, Default)]
pub struct VenueExtractor;

impl VenueExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for VenueExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Venue
    }

    fn listing_links(&self, html: &str, page_url: &str) -> Result<Vec<String>, ExtractionError> {
        let document = Html::parse_document(html);
        let more_selector = selector("a.more.buttons-hide")?;

        let links: Vec<String> = document
            .select(&more_selector)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| match resolve_link(page_url, href) {
                Ok(link) => Some(link),
                Err(e) => {
                    warn!("Skipping venue listing link: {}", e);
                    None
                }
            })
            .collect();
        debug!("Found {} venue detail links on {}", links.len(), page_url);
        Ok(links)
    }

    fn extract(&self, html: &str, source_url: &str) -> Result<Extraction, ExtractionError> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let title_selector = selector("h1.title")?;
        let description_selector = selector("div.description_inner")?;
        let paragraph_selector = selector("p")?;
        let sidebar_selector = selector("ul.eventDetailList")?;
        let month_selector = selector("span.m-date__month")?;
        let day_selector = selector("span.m-date__day")?;
        let year_selector = selector("span.m-date__year")?;
        let starts_selector = selector("li.sidebar_event_starts span")?;
        let price_selector = selector("li.sidebar_ticket_prices span")?;

        let title = first_text(root, &title_selector);
        let sidebar = document.select(&sidebar_selector).next();
        if title.is_none() && sidebar.is_none() {
            return Err(ExtractionError::MissingElement {
                selector: "h1.title, ul.eventDetailList".to_string(),
                url: source_url.to_string(),
            });
        }

        let description = document.select(&description_selector).next().map(|block| {
            block
                .select(&paragraph_selector)
                .filter_map(text_of)
                .collect::<Vec<_>>()
                .join(" ")
        });

        let mut fields = VenueFields {
            event_link: source_url.to_string(),
            title,
            description,
            ..VenueFields::default()
        };

        match sidebar {
            Some(sidebar) => {
                fields.month = first_text(sidebar, &month_selector);
                fields.day = first_text(sidebar, &day_selector);
                fields.year = first_text(sidebar, &year_selector);
                fields.start_time = first_text(sidebar, &starts_selector);
                fields.price = first_text(sidebar, &price_selector);
            }
            None => warn!("No event sidebar on {}; date and time fall back to defaults", source_url),
        }

        Ok(Extraction::single(FieldBag::Venue(fields)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"
        <html><body>
          <h1 class="title"> Comedy Night </h1>
          <div class="description_inner"><p>Stand-up.</p><p> Two sets. </p></div>
          <ul class="eventDetailList">
            <li class="item sidebar_event_date">
              <span class="m-date__month">Mar</span>
              <span class="m-date__day"> 14 </span>
              <span class="m-date__year">, 2025</span>
            </li>
            <li class="item sidebar_event_starts"><span> 7:30 PM </span></li>
            <li class="item sidebar_ticket_prices"><span>$25 - $75</span></li>
          </ul>
        </body></html>"#;

    #[test]
    fn reads_named_regions() {
        let url = "https://venue.example/events/detail/comedy-night";
        let extraction = VenueExtractor::new().extract(DETAIL, url).unwrap();
        let FieldBag::Venue(fields) = &extraction.bags[0] else {
            panic!("expected a venue bag");
        };

        assert_eq!(fields.title.as_deref(), Some("Comedy Night"));
        assert_eq!(fields.description.as_deref(), Some("Stand-up. Two sets."));
        assert_eq!(fields.month.as_deref(), Some("Mar"));
        assert_eq!(fields.day.as_deref(), Some("14"));
        assert_eq!(fields.year.as_deref(), Some(", 2025"));
        assert_eq!(fields.start_time.as_deref(), Some("7:30 PM"));
        assert_eq!(fields.price.as_deref(), Some("$25 - $75"));
        assert_eq!(fields.event_link, url);
    }

    #[test]
    fn listing_collects_more_links() {
        let listing = r#"
            <div class="info"><a class="more buttons-hide" href="/events/detail/a">More</a></div>
            <div class="info"><a class="more" href="/events/detail/ignored">More</a></div>
            <div class="info"><a class="more buttons-hide" href="https://venue.example/events/detail/b">More</a></div>"#;
        let links = VenueExtractor::new()
            .listing_links(listing, "https://venue.example/events/all")
            .unwrap();
        assert_eq!(
            links,
            vec![
                "https://venue.example/events/detail/a",
                "https://venue.example/events/detail/b"
            ]
        );
    }

    #[test]
    fn unrendered_page_is_an_extraction_error() {
        let err = VenueExtractor::new()
            .extract("<html><body><div id=\"app\"></div></body></html>", "https://venue.example/x")
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MissingElement { .. }));
    }
}
