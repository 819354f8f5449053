//! Browser driver abstraction
//!
//! Defines what the fetch pipeline demands of any rendering backend:
//! navigate with a load milestone, wait on selectors or network quiescence,
//! hand back the rendered DOM or raw response body, and capture screenshots.
//! The concrete engine lives behind these traits (currently Chromium via
//! chromiumoxide).

pub mod chromium;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub use crate::config::BrowserType;
pub use chromium::ChromiumDriver;

/// Errors surfaced by a browser driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser error: {0}")]
    Browser(String),
}

/// Load milestone that `navigate` resolves at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateUntil {
    /// The window load event
    Load,
    /// DOM parsed, subresources may still be loading
    DomContentLoaded,
}

/// Response captured for the main document of a navigation
#[derive(Debug, Clone)]
pub struct PageResponse {
    /// Final URL after redirects
    pub final_url: String,
    /// HTTP status code (0 when the driver saw no response)
    pub status_code: u16,
    /// Raw Content-Type header value, if any
    pub content_type: Option<String>,
    /// Response headers for the main document
    pub headers: Vec<(String, String)>,
}

impl PageResponse {
    /// Get a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A browser engine hosting one long-lived process that hands out pages
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a fresh page (tab)
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, DriverError>;

    /// Which engine this driver runs
    fn engine(&self) -> BrowserType;

    /// Whether the underlying browser process is up
    fn is_connected(&self) -> bool;

    /// Shut the browser process down
    async fn shutdown(&self) -> Result<(), DriverError>;
}

/// A single page, scoped to one fetch attempt
#[async_trait]
pub trait BrowserPage: Send {
    /// Apply extra HTTP headers to every request this page makes
    async fn set_extra_headers(
        &mut self,
        headers: &HashMap<String, String>,
    ) -> Result<(), DriverError>;

    /// Navigate and resolve at the given milestone, capturing the main
    /// document response
    async fn navigate(
        &mut self,
        url: &str,
        until: NavigateUntil,
        timeout: Duration,
    ) -> Result<PageResponse, DriverError>;

    /// Resolve once a CSS selector matches, or time out
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Resolve once no network requests have been in flight for a short
    /// quiescence window, or time out
    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), DriverError>;

    /// Rendered DOM serialized as HTML
    async fn content(&mut self) -> Result<String, DriverError>;

    /// Raw bytes of the main document response (PDFs, JSON, images)
    async fn response_body(&mut self) -> Result<Vec<u8>, DriverError>;

    /// Full-page PNG screenshot
    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError>;

    /// Release the page. Best effort; failures are logged, not surfaced.
    async fn close(self: Box<Self>);
}

/// Driver used when no browser is available (testing mode).
///
/// Keeps the service bootable without a Chromium installation; every page
/// request fails, which surfaces as a browser error on fetch.
pub struct NoopDriver {
    engine: BrowserType,
}

impl NoopDriver {
    pub fn new(engine: BrowserType) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl BrowserDriver for NoopDriver {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, DriverError> {
        Err(DriverError::Browser("browser not available".to_string()))
    }

    fn engine(&self) -> BrowserType {
        self.engine
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        Ok(())
    }
}
