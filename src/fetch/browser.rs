use crate::config::{BrowserConfig, ReadyState};
use crate::error::{FetchError, Result, ScraperError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument, warn};

/// Hands out browser sessions for script-rendered sources
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open_session(&self) -> std::result::Result<Box<dyn RenderSession>, FetchError>;
}

/// One browser tab driven one page at a time. `close` must be awaited on every
/// exit path; implementations also release on drop as a last resort.
#[async_trait]
pub trait RenderSession: Send {
    async fn render(&mut self, url: &str) -> std::result::Result<String, FetchError>;
    async fn close(self: Box<Self>) -> std::result::Result<(), FetchError>;
}

/// Headless browser reached over the W3C WebDriver protocol (chromedriver, geckodriver, selenium)
pub struct WebDriverBrowser {
    client: reqwest::Client,
    base: String,
    config: BrowserConfig,
    user_agent: String,
    slots: Arc<Semaphore>,
}

impl WebDriverBrowser {
    pub fn new(config: &BrowserConfig, user_agent: &str) -> Result<Self> {
        Self::with_pool(config, user_agent, 1)
    }

    /// `max_sessions` caps how many browser processes may be open at once.
    pub fn with_pool(config: &BrowserConfig, user_agent: &str, max_sessions: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1) + 5))
            .build()
            .map_err(|e| ScraperError::Config(format!("failed to build WebDriver client: {}", e)))?;
        Ok(Self {
            client,
            base: config.webdriver_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            user_agent: user_agent.to_string(),
            slots: Arc::new(Semaphore::new(max_sessions.max(1))),
        })
    }

    fn capabilities(&self) -> Value {
        let page_load_strategy = match self.config.ready {
            ReadyState::DomContentLoaded => "eager",
            ReadyState::NetworkIdle => "normal",
        };
        json!({
            "browserName": "chrome",
            "pageLoadStrategy": page_load_strategy,
            "timeouts": { "pageLoad": self.config.timeout_secs * 1000 },
            "goog:chromeOptions": {
                "args": [
                    "--headless=new",
                    "--disable-gpu",
                    format!("--user-agent={}", self.user_agent),
                ]
            }
        })
    }
}

#[async_trait]
impl Renderer for WebDriverBrowser {
    #[instrument(skip(self), fields(webdriver = %self.base))]
    async fn open_session(&self) -> std::result::Result<Box<dyn RenderSession>, FetchError> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Browser {
                message: "browser pool is closed".to_string(),
            })?;

        let url = format!("{}/session", self.base);
        let body = json!({ "capabilities": { "alwaysMatch": self.capabilities() } });
        let value = send_command(self.client.post(&url).json(&body), &url).await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::Browser {
                message: "new session response carried no sessionId".to_string(),
            })?
            .to_string();
        info!(session_id = %id, "Opened browser session");

        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base: self.base.clone(),
            id,
            ready: self.config.ready,
            idle: Duration::from_millis(self.config.idle_ms),
            timeout: Duration::from_secs(self.config.timeout_secs.max(1)),
            closed: false,
            _slot: slot,
        }))
    }
}

pub struct WebDriverSession {
    client: reqwest::Client,
    base: String,
    id: String,
    ready: ReadyState,
    idle: Duration,
    timeout: Duration,
    closed: bool,
    _slot: OwnedSemaphorePermit,
}

impl WebDriverSession {
    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/session/{}{}", self.base, self.id, suffix)
    }

    /// Polls `document.readyState` until complete, then waits out a quiet period.
    async fn wait_for_network_idle(&self) -> std::result::Result<(), FetchError> {
        let deadline = Instant::now() + self.timeout;
        let url = self.endpoint("/execute/sync");
        let script = json!({ "script": "return document.readyState", "args": [] });
        loop {
            let state = send_command(self.client.post(&url).json(&script), &url).await?;
            if state.as_str() == Some("complete") {
                break;
            }
            if Instant::now() >= deadline {
                return Err(FetchError::Timeout { url });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(self.idle).await;
        Ok(())
    }
}

#[async_trait]
impl RenderSession for WebDriverSession {
    #[instrument(skip(self), fields(session_id = %self.id))]
    async fn render(&mut self, url: &str) -> std::result::Result<String, FetchError> {
        let navigate = self.endpoint("/url");
        send_command(self.client.post(&navigate).json(&json!({ "url": url })), url).await?;

        if self.ready == ReadyState::NetworkIdle {
            self.wait_for_network_idle().await?;
        }

        let source = self.endpoint("/source");
        let value = send_command(self.client.get(&source), url).await?;
        let html = value.as_str().ok_or_else(|| FetchError::Browser {
            message: format!("no page source returned for {}", url),
        })?;
        debug!("Rendered {} ({} bytes)", url, html.len());
        Ok(html.to_string())
    }

    async fn close(mut self: Box<Self>) -> std::result::Result<(), FetchError> {
        self.closed = true;
        let url = self.endpoint("");
        send_command(self.client.delete(&url), &url).await?;
        info!(session_id = %self.id, "Closed browser session");
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let url = self.endpoint("");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(session_id = %self.id, "Browser session dropped without close; releasing");
                let client = self.client.clone();
                handle.spawn(async move {
                    if let Err(e) = client.delete(&url).send().await {
                        warn!("Failed to release browser session {}: {}", url, e);
                    }
                });
            }
            Err(_) => warn!("Browser session {} leaked: no runtime to release it", url),
        }
    }
}

/// Sends one WebDriver command and unwraps the protocol's `{"value": ...}` envelope.
async fn send_command(
    request: reqwest::RequestBuilder,
    url: &str,
) -> std::result::Result<Value, FetchError> {
    let resp = request
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(url, e))?;
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

    if !status.is_success() {
        let error = body
            .pointer("/value/error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        if error == "timeout" {
            return Err(FetchError::Timeout { url: url.to_string() });
        }
        let message = body
            .pointer("/value/message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(FetchError::Browser {
            message: format!("{} ({}) for {}: {}", error, status.as_u16(), url, message),
        });
    }

    Ok(body.get("value").cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn webdriver(server: &MockServer, source: &str) {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "abc", "capabilities": {} }
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/abc/source"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": source })))
            .mount(server)
            .await;
    }

    fn browser(server: &MockServer, ready: ReadyState) -> WebDriverBrowser {
        let config = BrowserConfig {
            webdriver_url: server.uri(),
            ready,
            idle_ms: 10,
            timeout_secs: 2,
        };
        WebDriverBrowser::new(&config, "test-agent").unwrap()
    }

    #[tokio::test]
    async fn renders_and_closes_session() {
        let server = MockServer::start().await;
        webdriver(&server, "<html><h1 class=\"title\">Show</h1></html>").await;
        Mock::given(method("DELETE"))
            .and(path("/session/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let browser = browser(&server, ReadyState::DomContentLoaded);
        let mut session = browser.open_session().await.unwrap();
        let html = session.render("https://venue.example/show").await.unwrap();
        assert!(html.contains("Show"));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn dom_content_loaded_maps_to_eager_page_load() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({
                "capabilities": { "alwaysMatch": { "pageLoadStrategy": "eager" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "abc" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(&server)
            .await;

        let session = browser(&server, ReadyState::DomContentLoaded)
            .open_session()
            .await
            .unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn network_idle_polls_ready_state() {
        let server = MockServer::start().await;
        webdriver(&server, "<html></html>").await;
        Mock::given(method("POST"))
            .and(path("/session/abc/execute/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "complete" })))
            .expect(1..)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(&server)
            .await;

        let browser = browser(&server, ReadyState::NetworkIdle);
        let mut session = browser.open_session().await.unwrap();
        session.render("https://venue.example/show").await.unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn navigation_timeout_is_reported_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "abc" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/abc/url"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": { "error": "timeout", "message": "page load timed out" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(&server)
            .await;

        let browser = browser(&server, ReadyState::DomContentLoaded);
        let mut session = browser.open_session().await.unwrap();
        let err = session.render("https://venue.example/slow").await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_session_is_still_released() {
        let server = MockServer::start().await;
        webdriver(&server, "<html></html>").await;
        Mock::given(method("DELETE"))
            .and(path("/session/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(&server)
            .await;

        let browser = browser(&server, ReadyState::DomContentLoaded);
        let session = browser.open_session().await.unwrap();
        drop(session);

        let mut released = false;
        for _ in 0..50 {
            let requests = server.received_requests().await.unwrap_or_default();
            if requests.iter().any(|r| r.method.as_str() == "DELETE") {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(released, "drop should release the browser session");
    }
}
