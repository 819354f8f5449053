//! Fetch request/response types
//!
//! JSON-serializable types shared by the HTTP API and the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::FetchError;

/// Maximum number of requests accepted in one batch call
pub const MAX_BATCH_SIZE: usize = 10;

/// Strategy for deciding when a navigated page is ready for extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitStrategy {
    /// The window load event
    #[default]
    Load,
    /// DOM parsed, earlier than load
    Domcontentloaded,
    /// No in-flight network requests for a quiescence window
    Networkidle,
    /// A CSS selector matches
    Selector,
    /// Unconditional settle sleep
    Timeout,
}

/// Request to fetch a web page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    /// URL to fetch
    pub url: String,
    /// CSS selector to wait for before extraction
    #[serde(default)]
    pub wait_for_selector: Option<String>,
    /// Override the default settle time after load (ms)
    #[serde(default)]
    pub wait_after_load_ms: Option<u64>,
    /// Wait strategy for dynamic content
    #[serde(default)]
    pub wait_strategy: WaitStrategy,
    /// Extract clean text from the page
    #[serde(default = "default_true")]
    pub extract_text: bool,
    /// Extract links from the page
    #[serde(default)]
    pub extract_links: bool,
    /// Extract metadata from the page
    #[serde(default = "default_true")]
    pub extract_metadata: bool,
    /// Capture a full-page screenshot (base64 PNG)
    #[serde(default)]
    pub screenshot: bool,
    /// Override the default navigation timeout (ms), clamped to the
    /// configured maximum
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Use the response cache for this request
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Additional HTTP request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl FetchRequest {
    /// A request for `url` with all defaults.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait_for_selector: None,
            wait_after_load_ms: None,
            wait_strategy: WaitStrategy::default(),
            extract_text: true,
            extract_links: false,
            extract_metadata: true,
            screenshot: false,
            timeout_ms: None,
            cache: true,
            headers: HashMap::new(),
        }
    }

    /// The strategy actually applied: a set `wait_for_selector` coerces the
    /// strategy to [`WaitStrategy::Selector`] regardless of the requested
    /// value.
    pub fn effective_wait_strategy(&self) -> WaitStrategy {
        if self.wait_for_selector.is_some() {
            WaitStrategy::Selector
        } else {
            self.wait_strategy
        }
    }
}

/// Extracted page metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub language: Option<String>,
    pub canonical_url: Option<String>,
    pub author: Option<String>,
    pub published_date: Option<String>,
    pub pdf_pages: Option<usize>,
    pub pdf_author: Option<String>,
    pub pdf_created_date: Option<String>,
}

/// A link extracted from a page, in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLink {
    /// Absolute URL resolved against the page URL
    pub href: String,
    /// Visible text with whitespace collapsed
    pub text: String,
    /// The anchor's `rel` attribute, if present
    pub rel: Option<String>,
}

/// Structured data extracted from a page (JSON-LD and microdata)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredData {
    /// Parsed `application/ld+json` payloads, malformed entries dropped
    pub json_ld: Vec<serde_json::Value>,
    /// Schema.org microdata items flattened into nested objects
    pub microdata: Vec<serde_json::Value>,
    /// Distinct schema.org type names seen, sorted
    pub schema_org_types: Vec<String>,
}

impl StructuredData {
    pub fn is_empty(&self) -> bool {
        self.json_ld.is_empty() && self.microdata.is_empty() && self.schema_org_types.is_empty()
    }
}

/// Result of a fetch operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status code (0 when no response was seen)
    pub status_code: u16,
    /// Extracted text, truncated to the configured maximum
    pub content_text: Option<String>,
    /// Canonical lowercased MIME type of the response
    pub content_type: Option<String>,
    pub metadata: Option<PageMetadata>,
    pub links: Option<Vec<ExtractedLink>>,
    pub structured_data: Option<StructuredData>,
    pub screenshot_base64: Option<String>,
    /// Length of `content_text` in bytes
    pub content_length: usize,
    /// Wall time spent on this request (ms)
    pub elapsed_ms: u64,
    /// Whether this result was served from the cache
    pub cached: bool,
    /// Populated on failure; mutually exclusive with rendered content
    pub error: Option<FetchError>,
}

impl FetchResult {
    /// A failed result carrying only the error, URL, and status.
    pub fn failure(
        url: impl Into<String>,
        status_code: u16,
        error: FetchError,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            url: url.into(),
            status_code,
            elapsed_ms,
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Closed dispatch set derived from the canonical MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Pdf,
    Json,
    Text,
    Image,
    Other,
}

impl ContentKind {
    /// Classify a canonical (lowercased, parameter-free) MIME type.
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("text/html") || mime.starts_with("application/xhtml") {
            Self::Html
        } else if mime == "application/pdf" {
            Self::Pdf
        } else if mime == "application/json" || mime.ends_with("+json") {
            Self::Json
        } else if mime == "text/plain" {
            Self::Text
        } else if mime.starts_with("image/") {
            Self::Image
        } else {
            Self::Other
        }
    }
}

/// Canonicalize a raw Content-Type header: lowercase, parameters stripped.
/// Absent headers default to `text/html`, matching what browsers render.
pub fn canonical_mime(raw: Option<&str>) -> String {
    raw.unwrap_or("text/html")
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_from_minimal_json() {
        let req: FetchRequest = serde_json::from_str(r#"{"url":"https://example.com"}"#).unwrap();
        assert!(req.extract_text);
        assert!(req.extract_metadata);
        assert!(!req.extract_links);
        assert!(!req.screenshot);
        assert!(req.cache);
        assert_eq!(req.wait_strategy, WaitStrategy::Load);
        assert!(req.headers.is_empty());
    }

    #[test]
    fn selector_coerces_wait_strategy() {
        let mut req = FetchRequest::new("https://example.com");
        req.wait_strategy = WaitStrategy::Networkidle;
        req.wait_for_selector = Some("#app".to_string());
        assert_eq!(req.effective_wait_strategy(), WaitStrategy::Selector);

        req.wait_for_selector = None;
        assert_eq!(req.effective_wait_strategy(), WaitStrategy::Networkidle);
    }

    #[test]
    fn wait_strategy_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&WaitStrategy::Domcontentloaded).unwrap(),
            "\"domcontentloaded\""
        );
        let s: WaitStrategy = serde_json::from_str("\"networkidle\"").unwrap();
        assert_eq!(s, WaitStrategy::Networkidle);
    }

    #[test]
    fn canonical_mime_strips_parameters() {
        assert_eq!(
            canonical_mime(Some("Text/HTML; charset=UTF-8")),
            "text/html"
        );
        assert_eq!(canonical_mime(None), "text/html");
    }

    #[test]
    fn content_kind_dispatch() {
        assert_eq!(ContentKind::from_mime("text/html"), ContentKind::Html);
        assert_eq!(
            ContentKind::from_mime("application/xhtml+xml"),
            ContentKind::Html
        );
        assert_eq!(ContentKind::from_mime("application/pdf"), ContentKind::Pdf);
        assert_eq!(ContentKind::from_mime("application/json"), ContentKind::Json);
        assert_eq!(
            ContentKind::from_mime("application/activity+json"),
            ContentKind::Json
        );
        assert_eq!(ContentKind::from_mime("text/plain"), ContentKind::Text);
        assert_eq!(ContentKind::from_mime("image/png"), ContentKind::Image);
        assert_eq!(
            ContentKind::from_mime("application/octet-stream"),
            ContentKind::Other
        );
    }

    #[test]
    fn fetch_result_round_trips_through_json() {
        let result = FetchResult {
            url: "https://example.com/".to_string(),
            status_code: 200,
            content_text: Some("hello".to_string()),
            content_type: Some("text/html".to_string()),
            metadata: Some(PageMetadata {
                title: Some("T".to_string()),
                ..Default::default()
            }),
            links: Some(vec![ExtractedLink {
                href: "https://example.com/about".to_string(),
                text: "About".to_string(),
                rel: Some("nofollow".to_string()),
            }]),
            structured_data: Some(StructuredData::default()),
            screenshot_base64: None,
            content_length: 5,
            elapsed_ms: 12,
            cached: false,
            error: None,
        };

        let json = serde_json::to_string(&result).unwrap();
        let back: FetchResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
