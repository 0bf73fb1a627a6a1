//! Page retrieval: plain HTTP for static sources, a WebDriver-controlled
//! browser for sources that only show their content after scripts run.

pub mod browser;
pub mod http_client;
pub mod rate_limiter;

pub use browser::{RenderSession, Renderer, WebDriverBrowser};
pub use http_client::StaticFetcher;
pub use rate_limiter::{Limits, RateLimiter};

use crate::error::FetchError;
use async_trait::async_trait;

/// Returns the raw HTML behind a URL
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
