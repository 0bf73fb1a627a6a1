use super::{first_text, selector, text_of, Extraction, Extractor};
use crate::constants::FALLBACK_SPORT;
use crate::error::ExtractionError;
use crate::types::{AthleticsFields, FieldBag, SourceKind};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

static SPORT_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d-]+ (.*) Schedule").expect("valid sport heading regex"));

/// Athletics schedule pages: one row per home game, read positionally.
#[derive(Debug, Default)]
pub struct AthleticsExtractor;

impl AthleticsExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// "2025 Football Schedule" -> "Football"
pub fn sport_from_heading(heading: &str) -> String {
    SPORT_HEADING_RE
        .captures(heading.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_SPORT.to_string())
}

struct RowSelectors {
    opponent_link: Selector,
    opponent: Selector,
    date_spans: Selector,
    location_spans: Selector,
}

impl RowSelectors {
    fn new() -> Result<Self, ExtractionError> {
        Ok(Self {
            opponent_link: selector("div.sidearm-schedule-game-opponent-name a")?,
            opponent: selector("div.sidearm-schedule-game-opponent-name")?,
            date_spans: selector("div.sidearm-schedule-game-opponent-date span")?,
            location_spans: selector("div.sidearm-schedule-game-location span")?,
        })
    }
}

fn read_row(
    row: ElementRef<'_>,
    sels: &RowSelectors,
    sport: &str,
    page_url: &str,
) -> Result<AthleticsFields, ExtractionError> {
    let opponent = first_text(row, &sels.opponent_link)
        .or_else(|| first_text(row, &sels.opponent))
        .ok_or_else(|| ExtractionError::MissingField {
            field: "opponent".to_string(),
            url: page_url.to_string(),
        })?;

    let mut date_spans = row.select(&sels.date_spans).map(|s| text_of(s).unwrap_or_default());
    let date_token = date_spans.next().filter(|s| !s.is_empty());
    let time_token = date_spans.next().filter(|s| !s.is_empty());

    let location_parts = row.select(&sels.location_spans).filter_map(text_of).collect();

    Ok(AthleticsFields {
        event_link: page_url.to_string(),
        sport: sport.to_string(),
        opponent: Some(opponent),
        date_token,
        time_token,
        location_parts,
    })
}

impl Extractor for AthleticsExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Athletics
    }

    fn follows_links(&self) -> bool {
        false
    }

    fn extract(&self, html: &str, source_url: &str) -> Result<Extraction, ExtractionError> {
        let document = Html::parse_document(html);
        let heading_selector = selector("div.sidearm-schedule-title h2")?;
        let row_selector = selector("li.sidearm-schedule-home-game")?;
        let sels = RowSelectors::new()?;

        let sport = first_text(document.root_element(), &heading_selector)
            .map(|h| sport_from_heading(&h))
            .unwrap_or_else(|| FALLBACK_SPORT.to_string());

        let mut extraction = Extraction::default();
        for (index, row) in document.select(&row_selector).enumerate() {
            match read_row(row, &sels, &sport, source_url) {
                Ok(fields) => extraction.bags.push(FieldBag::Athletics(fields)),
                Err(e) => {
                    warn!("Skipping schedule row {} on {}: {}", index, source_url, e);
                    extraction.skipped.push(format!("row {}: {}", index, e));
                }
            }
        }
        debug!("{} {} home games on {}", extraction.bags.len(), sport, source_url);
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEDULE: &str = r#"
        <html><body>
          <div class="sidearm-schedule-title"><h2>2025 Football Schedule</h2></div>
          <ul>
            <li class="sidearm-schedule-game sidearm-schedule-home-game">
              <div class="sidearm-schedule-game-opponent-date">
                <span>Sep 6 (Sat)</span><span>6:30 PM CT</span>
              </div>
              <div class="sidearm-schedule-game-opponent-name"><a href="/x">Western Michigan</a></div>
              <div class="sidearm-schedule-game-location"><span>Champaign, Ill.</span><span>Memorial Stadium</span></div>
            </li>
            <li class="sidearm-schedule-game sidearm-schedule-away-game">
              <div class="sidearm-schedule-game-opponent-name"><a>Away Team</a></div>
            </li>
            <li class="sidearm-schedule-game sidearm-schedule-home-game">
              <div class="sidearm-schedule-game-opponent-date"><span>Nov 22 (Sat)</span><span>TBA</span></div>
            </li>
            <li class="sidearm-schedule-game sidearm-schedule-home-game">
              <div class="sidearm-schedule-game-opponent-date"><span>Oct 4 (Sat)</span></div>
              <div class="sidearm-schedule-game-opponent-name">Purdue</div>
              <div class="sidearm-schedule-game-location"><span>Champaign, Ill.</span></div>
            </li>
          </ul>
        </body></html>"#;

    #[test]
    fn sport_heading_pattern() {
        assert_eq!(sport_from_heading("2025 Football Schedule"), "Football");
        assert_eq!(
            sport_from_heading(" 2024-25 Men's Basketball Schedule "),
            "Men's Basketball"
        );
        assert_eq!(sport_from_heading("Schedule"), FALLBACK_SPORT);
    }

    #[test]
    fn reads_home_rows_and_skips_broken_ones() {
        let url = "https://fightingillini.com/sports/football/schedule";
        let extraction = AthleticsExtractor::new().extract(SCHEDULE, url).unwrap();

        assert_eq!(extraction.bags.len(), 2);
        assert_eq!(extraction.skipped.len(), 1, "row without opponent is skipped");

        let FieldBag::Athletics(first) = &extraction.bags[0] else {
            panic!("expected an athletics bag");
        };
        assert_eq!(first.sport, "Football");
        assert_eq!(first.opponent.as_deref(), Some("Western Michigan"));
        assert_eq!(first.date_token.as_deref(), Some("Sep 6 (Sat)"));
        assert_eq!(first.time_token.as_deref(), Some("6:30 PM CT"));
        assert_eq!(first.location_parts, vec!["Champaign, Ill.", "Memorial Stadium"]);
        assert_eq!(first.event_link, url);

        let FieldBag::Athletics(second) = &extraction.bags[1] else {
            panic!("expected an athletics bag");
        };
        assert_eq!(second.opponent.as_deref(), Some("Purdue"));
        assert!(second.time_token.is_none());
    }
}
