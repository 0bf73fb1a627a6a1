use super::PageFetcher;
use crate::config::FetchConfig;
use crate::error::{FetchError, Result, ScraperError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Static-page fetcher. One client is shared by every request so connections
/// to the same host are reused across a listing and its detail pages.
#[derive(Clone)]
pub struct StaticFetcher {
    client: reqwest::Client,
}

impl StaticFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| ScraperError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        let target = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let resp = self
            .client
            .get(target)
            .header("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("accept-language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        debug!("HTTP response: status={}, size={} bytes", status.as_u16(), body.len());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> StaticFetcher {
        StaticFetcher::new(&FetchConfig {
            timeout_secs: 5,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list/7"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let body = fetcher()
            .fetch(&format!("{}/list/7", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher().fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_before_sending() {
        let err = fetcher().fetch("calendars/list/7").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let fetcher = StaticFetcher::new(&FetchConfig {
            timeout_secs: 1,
            ..FetchConfig::default()
        })
        .unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
    }
}
