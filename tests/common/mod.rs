//! Shared test fixtures: a scripted browser driver and pipeline wiring

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use iris::browser::{BrowserDriver, BrowserPage, DriverError, NavigateUntil, PageResponse};
use iris::cache::ResponseCache;
use iris::config::{BrowserType, Config};
use iris::fetch::Fetcher;
use iris::limiter::DomainRateLimiter;
use iris::robots::RobotsPolicy;

/// One scripted navigation outcome
#[derive(Clone)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub raw: Option<Vec<u8>>,
    pub final_url: Option<String>,
    /// When set, navigation fails with this driver message
    pub error: Option<String>,
}

impl StubResponse {
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.to_string(),
            raw: None,
            final_url: None,
            error: None,
        }
    }

    pub fn text(body: &str) -> Self {
        Self::html(body).with_content_type("text/plain")
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn navigation_error(message: &str) -> Self {
        Self {
            status: 0,
            content_type: String::new(),
            body: String::new(),
            raw: None,
            final_url: None,
            error: Some(message.to_string()),
        }
    }
}

#[derive(Default)]
struct StubState {
    /// Per-URL response scripts; the last response for a URL repeats once
    /// its queue drains
    responses: Mutex<HashMap<String, VecDeque<StubResponse>>>,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
}

impl StubState {
    fn next_response(&self, url: &str) -> Result<StubResponse, DriverError> {
        let mut responses = self.responses.lock();
        let queue = responses
            .get_mut(url)
            .ok_or_else(|| DriverError::Navigation(format!("no stub response for {url}")))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().expect("non-empty queue"))
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| DriverError::Navigation(format!("no stub response for {url}")))
        }
    }
}

/// Scripted driver standing in for the browser
#[derive(Default)]
pub struct StubDriver {
    state: Arc<StubState>,
}

impl StubDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enqueue(&self, url: &str, response: StubResponse) {
        self.state
            .responses
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn pages_opened(&self) -> usize {
        self.state.pages_opened.load(Ordering::SeqCst)
    }

    pub fn pages_closed(&self) -> usize {
        self.state.pages_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserDriver for StubDriver {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, DriverError> {
        self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubPage {
            state: self.state.clone(),
            response: None,
        }))
    }

    fn engine(&self) -> BrowserType {
        BrowserType::Chromium
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

struct StubPage {
    state: Arc<StubState>,
    response: Option<StubResponse>,
}

#[async_trait]
impl BrowserPage for StubPage {
    async fn set_extra_headers(
        &mut self,
        _headers: &HashMap<String, String>,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        _until: NavigateUntil,
        _timeout: Duration,
    ) -> Result<PageResponse, DriverError> {
        let response = self.state.next_response(url)?;
        if let Some(message) = &response.error {
            return Err(DriverError::Navigation(message.clone()));
        }

        let page_response = PageResponse {
            final_url: response
                .final_url
                .clone()
                .unwrap_or_else(|| url.to_string()),
            status_code: response.status,
            content_type: Some(response.content_type.clone()),
            headers: Vec::new(),
        };
        self.response = Some(response);
        Ok(page_response)
    }

    async fn wait_for_selector(
        &mut self,
        _selector: &str,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn wait_for_network_idle(&mut self, _timeout: Duration) -> Result<(), DriverError> {
        Ok(())
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        self.response
            .as_ref()
            .map(|r| r.body.clone())
            .ok_or_else(|| DriverError::Browser("no navigation yet".to_string()))
    }

    async fn response_body(&mut self) -> Result<Vec<u8>, DriverError> {
        self.response
            .as_ref()
            .map(|r| r.raw.clone().unwrap_or_else(|| r.body.clone().into_bytes()))
            .ok_or_else(|| DriverError::Browser("no navigation yet".to_string()))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn close(self: Box<Self>) {
        self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A config tuned for fast, deterministic tests: no settle sleeps, tiny
/// backoff, generous rate limits, robots off.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.testing_mode = true;
    config.browser.wait_after_load_ms = 0;
    config.browser.max_concurrent_pages = 8;
    config.fetch.retry_base_delay_ms = 10;
    config.rate_limit.min_delay_ms = 10;
    config.rate_limit.burst = 100;
    config.robots.respect_robots_txt = false;
    config
}

/// Wire a fetcher over the stub driver with in-memory stores.
pub fn build_fetcher(
    driver: Arc<StubDriver>,
    config: &Config,
) -> (Arc<Fetcher>, Arc<ResponseCache>) {
    let cache = Arc::new(ResponseCache::in_memory(&config.cache));
    let limiter = Arc::new(DomainRateLimiter::new(None, &config.rate_limit));
    let robots = Arc::new(RobotsPolicy::new(
        config.robots.clone(),
        config.browser.user_agent.clone(),
        None,
    ));
    let fetcher = Arc::new(Fetcher::new(
        driver,
        cache.clone(),
        limiter,
        robots,
        config,
    ));
    (fetcher, cache)
}
