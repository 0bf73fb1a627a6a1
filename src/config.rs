use crate::constants::{
    ATHLETICS_HOME_TEAM, ATHLETICS_HOST, ATHLETICS_SOURCE, ATHLETICS_TAG, ATHLETIC_SCHEDULE_LINKS,
    DEFAULT_USER_AGENT, GENERAL_CALENDAR_LINKS, GENERAL_SOURCE, STATE_FARM_CALENDAR_LINK,
    STATE_FARM_HOST, STATE_FARM_LOCATION, STATE_FARM_SOURCE, STATE_FARM_TAG, VENUE_SHOW_HOURS,
};
use crate::error::{Result, ScraperError};
use crate::types::{SourceDescriptor, SourceKind};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "CAMPUS_EVENTS_CONFIG";
pub const WEBDRIVER_URL_ENV: &str = "CAMPUS_EVENTS_WEBDRIVER_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Throttle for detail-page requests within one source; unset means unthrottled
    pub requests_per_min: Option<u64>,
    pub detail_concurrency: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            requests_per_min: Some(120),
            detail_concurrency: 4,
        }
    }
}

/// Page readiness the browser waits for before the document is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub ready: ReadyState,
    /// Quiet period after `document.readyState == "complete"` for network-idle waits
    pub idle_ms: u64,
    pub timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            ready: ReadyState::DomContentLoaded,
            idle_ms: 500,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Remote document endpoint that receives each run (PUT)
    pub remote_url: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("json"),
            remote_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Abort remaining source work after this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            browser: BrowserConfig::default(),
            output: OutputConfig::default(),
            run: RunConfig::default(),
            sources: default_sources(),
        }
    }
}

fn default_sources() -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor {
            name: GENERAL_SOURCE.to_string(),
            kind: SourceKind::General,
            urls: GENERAL_CALENDAR_LINKS.iter().map(|s| s.to_string()).collect(),
            rendered: false,
            location: None,
            tag: None,
            host: None,
            home_team: None,
            show_hours: None,
        },
        SourceDescriptor {
            name: STATE_FARM_SOURCE.to_string(),
            kind: SourceKind::Venue,
            urls: vec![STATE_FARM_CALENDAR_LINK.to_string()],
            rendered: true,
            location: Some(STATE_FARM_LOCATION.to_string()),
            tag: Some(STATE_FARM_TAG.to_string()),
            host: Some(STATE_FARM_HOST.to_string()),
            home_team: None,
            show_hours: Some(VENUE_SHOW_HOURS),
        },
        SourceDescriptor {
            name: ATHLETICS_SOURCE.to_string(),
            kind: SourceKind::Athletics,
            urls: ATHLETIC_SCHEDULE_LINKS.iter().map(|s| s.to_string()).collect(),
            rendered: false,
            location: None,
            tag: Some(ATHLETICS_TAG.to_string()),
            host: Some(ATHLETICS_HOST.to_string()),
            home_team: Some(ATHLETICS_HOME_TEAM.to_string()),
            show_hours: None,
        },
    ]
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let mut config: Config = toml::from_str(&config_content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Loads `CAMPUS_EVENTS_CONFIG` (or `config.toml` when present), else the built-in defaults.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
        if Path::new(&path).exists() {
            return Self::load(path);
        }
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(WEBDRIVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.browser.webdriver_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(ScraperError::Config(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            if source.urls.is_empty() {
                return Err(ScraperError::Config(format!(
                    "source '{}' has no urls",
                    source.name
                )));
            }
        }
        Ok(())
    }

    /// Keeps only the named sources, in configuration order.
    pub fn select_sources(&mut self, names: &[String]) -> Result<()> {
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.sources.iter().any(|s| &s.name == *n))
        {
            return Err(ScraperError::Config(format!("unknown source '{}'", unknown)));
        }
        self.sources.retain(|s| names.contains(&s.name));
        Ok(())
    }
}
