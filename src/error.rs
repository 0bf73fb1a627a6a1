use thiserror::Error;

/// Failure retrieving a page. Fatal for a whole source when it hits a listing
/// page, fatal for one item when it hits a detail page.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("browser session error: {message}")]
    Browser { message: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Expected markup was not where the extractor looked for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("invalid selector `{0}`")]
    Selector(String),

    #[error("missing element `{selector}` on {url}")]
    MissingElement { selector: String, url: String },

    #[error("missing field `{field}` on {url}")]
    MissingField { field: String, url: String },
}

/// Date or time text that no rule could parse. Never leaves the normalizer:
/// callers see the sentinel/default value instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("unparsable date `{0}`")]
    UnparsableDate(String),

    #[error("unparsable time `{0}`")]
    UnparsableTime(String),
}

/// A field bag that cannot be mapped onto the canonical event at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("field bag from {source_name} has no event link")]
    MissingLink { source_name: String },
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {message}")]
    Storage { message: String },
}

pub type Result<T> = std::result::Result<T, ScraperError>;
