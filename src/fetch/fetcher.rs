//! Fetch orchestrator
//!
//! Coordinates the full pipeline for one request: URL validation, cache
//! lookup, robots.txt gate, per-domain rate limiting, the global page
//! semaphore, a bounded retry loop around browser navigation, content-type
//! dispatch into the extractors, truncation, and the cache store.
//!
//! `fetch` never returns `Err`; every failure is carried in the result's
//! `error` field so batch calls and the HTTP surface compose trivially.

use base64::Engine as _;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserDriver, BrowserPage};
use crate::cache::{self, ResponseCache};
use crate::config::{BrowserConfig, Config, FetchConfig};
use crate::extract::{ContentExtractor, PdfExtractor};
use crate::limiter::{registrable_domain, DomainRateLimiter};
use crate::robots::RobotsPolicy;
use crate::util::truncate_to_bytes;

use super::error::{classify_driver_error, classify_http_status, FetchError, FetchErrorKind};
use super::types::{
    canonical_mime, ContentKind, FetchRequest, FetchResult, PageMetadata, WaitStrategy,
};
use super::wait::{apply_wait, navigate_milestone};

/// Upper bound on one backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Uniform jitter added to each backoff sleep (ms)
const BACKOFF_JITTER_MS: u64 = 100;

/// Orchestrates fetches against the browser driver
pub struct Fetcher {
    driver: Arc<dyn BrowserDriver>,
    cache: Arc<ResponseCache>,
    limiter: Arc<DomainRateLimiter>,
    robots: Arc<RobotsPolicy>,
    extractor: ContentExtractor,
    browser_config: BrowserConfig,
    fetch_config: FetchConfig,
    /// Bounds browser pages in flight across all requests
    pages: Semaphore,
}

impl Fetcher {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        cache: Arc<ResponseCache>,
        limiter: Arc<DomainRateLimiter>,
        robots: Arc<RobotsPolicy>,
        config: &Config,
    ) -> Self {
        Self {
            driver,
            cache,
            limiter,
            robots,
            extractor: ContentExtractor::new(),
            browser_config: config.browser.clone(),
            fetch_config: config.fetch.clone(),
            pages: Semaphore::new(config.browser.max_concurrent_pages),
        }
    }

    /// Fetch a single URL through the full pipeline.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResult {
        let started = Instant::now();

        // 1. Validate the URL before touching any shared state.
        let url = match validate_url(&request.url) {
            Ok(url) => url,
            Err(error) => {
                return FetchResult::failure(&request.url, 0, error, elapsed_ms(started));
            }
        };

        // 2. Cache lookup.
        let key = cache::fingerprint(request);
        if request.cache {
            if let Some(mut hit) = self.cache.get(&key).await {
                debug!(url = %url, "cache hit");
                hit.cached = true;
                return hit;
            }
        }

        // 3. robots.txt gate.
        if !self.robots.allowed(&url).await {
            info!(url = %url, "blocked by robots.txt");
            let error = FetchError::of(
                FetchErrorKind::BlockedByRobotsTxt,
                format!("{url} is disallowed by robots.txt"),
            );
            return FetchResult::failure(url.as_str(), 0, error, elapsed_ms(started));
        }

        // 4. Per-domain rate limit; may suspend. Origins can stretch their
        // own delay via robots.txt crawl-delay.
        let domain = registrable_domain(&url);
        let crawl_delay = self.robots.crawl_delay(&url).await;
        self.limiter.acquire_with_delay(&domain, crawl_delay).await;

        // 5. Global concurrency gate.
        let _permit = match self.pages.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                let error =
                    FetchError::of(FetchErrorKind::BrowserError, "page semaphore closed");
                return FetchResult::failure(url.as_str(), 0, error, elapsed_ms(started));
            }
        };

        // 6. Bounded attempt loop with backoff between retryable failures.
        let timeout = self.effective_timeout(request);
        let mut terminal: Option<FetchError> = None;

        for attempt in 0..=self.fetch_config.max_retries {
            match self.attempt(request, &url, timeout).await {
                Ok(mut result) => {
                    // 7. Truncate to the configured cap.
                    if let Some(text) = result.content_text.take() {
                        let truncated = truncate_to_bytes(&text, self.fetch_config.max_content_length);
                        result.content_length = truncated.len();
                        result.content_text = Some(truncated.to_string());
                    }
                    result.elapsed_ms = elapsed_ms(started);

                    // 8. Store; the cache itself refuses error-carrying entries.
                    if request.cache {
                        self.cache.put(&key, &result).await;
                    }
                    return result;
                }
                Err(error) => {
                    if error.retryable && attempt < self.fetch_config.max_retries {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            url = %url,
                            attempt,
                            kind = error.kind.as_str(),
                            delay_ms = delay.as_millis() as u64,
                            "retryable fetch failure; backing off"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    terminal = Some(error);
                    break;
                }
            }
        }

        let error = terminal.unwrap_or_else(|| {
            FetchError::of(FetchErrorKind::BrowserError, "attempt loop exhausted")
        });
        let status = error.http_status.unwrap_or(0);
        warn!(url = %url, kind = error.kind.as_str(), "fetch failed");
        FetchResult::failure(url.as_str(), status, error, elapsed_ms(started))
    }

    /// Fetch up to [`super::MAX_BATCH_SIZE`] requests concurrently.
    ///
    /// Each item is independently rate-limited and gated; partial failures
    /// are returned per item and never fail the batch.
    pub async fn fetch_batch(&self, requests: &[FetchRequest]) -> Vec<FetchResult> {
        futures::future::join_all(requests.iter().map(|request| self.fetch(request))).await
    }

    /// One attempt: open a page, run it, and release the page on every
    /// exit path.
    async fn attempt(
        &self,
        request: &FetchRequest,
        url: &Url,
        timeout: Duration,
    ) -> Result<FetchResult, FetchError> {
        let mut page = self
            .driver
            .new_page()
            .await
            .map_err(|e| classify_driver_error(&e))?;

        let outcome = self.run_attempt(page.as_mut(), request, url, timeout).await;
        page.close().await;
        outcome
    }

    async fn run_attempt(
        &self,
        page: &mut dyn BrowserPage,
        request: &FetchRequest,
        url: &Url,
        timeout: Duration,
    ) -> Result<FetchResult, FetchError> {
        if !request.headers.is_empty() {
            page.set_extra_headers(&request.headers)
                .await
                .map_err(|e| classify_driver_error(&e))?;
        }

        let strategy = request.effective_wait_strategy();
        let settle = Duration::from_millis(
            request
                .wait_after_load_ms
                .unwrap_or(self.browser_config.wait_after_load_ms),
        );

        // Navigation and the wait phase share one hard deadline.
        let deadline = async {
            let response = page
                .navigate(url.as_str(), navigate_milestone(strategy), timeout)
                .await
                .map_err(|e| classify_driver_error(&e))?;

            apply_wait(
                &mut *page,
                strategy,
                request.wait_for_selector.as_deref(),
                timeout,
                settle,
            )
            .await
            .map_err(|e| classify_driver_error(&e))?;

            Ok::<_, FetchError>(response)
        };
        let response = tokio::time::timeout(timeout, deadline)
            .await
            .map_err(|_| {
                FetchError::of(
                    FetchErrorKind::Timeout,
                    format!("deadline of {}ms exceeded", timeout.as_millis()),
                )
            })??;

        if response.status_code >= 400 {
            return Err(classify_http_status(response.status_code));
        }

        // The timeout strategy already slept; everyone else settles now.
        if strategy != WaitStrategy::Timeout && !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let final_url = Url::parse(&response.final_url).unwrap_or_else(|_| url.clone());
        let mime = canonical_mime(response.content_type.as_deref());

        let mut result = FetchResult {
            url: final_url.to_string(),
            status_code: response.status_code,
            content_type: Some(mime.clone()),
            ..Default::default()
        };

        match ContentKind::from_mime(&mime) {
            ContentKind::Html => {
                let html = page.content().await.map_err(|e| classify_driver_error(&e))?;
                self.check_body_size(html.len())?;

                if request.extract_text {
                    result.content_text = Some(self.extractor.extract_text(&html));
                }
                if request.extract_metadata {
                    result.metadata = Some(self.extractor.extract_metadata(&html, &final_url));
                }
                if request.extract_links {
                    result.links = Some(self.extractor.extract_links(&html, &final_url));
                }
                result.structured_data = Some(self.extractor.extract_structured_data(&html));
            }
            ContentKind::Pdf => {
                let bytes = page
                    .response_body()
                    .await
                    .map_err(|e| classify_driver_error(&e))?;
                self.check_body_size(bytes.len())?;

                let document = PdfExtractor::extract(&bytes)
                    .map_err(|e| FetchError::of(FetchErrorKind::BrowserError, e.to_string()))?;

                if request.extract_text {
                    result.content_text = Some(document.text);
                }
                if request.extract_metadata {
                    result.metadata = Some(PageMetadata {
                        title: document.title,
                        author: document.author.clone(),
                        pdf_pages: Some(document.pages),
                        pdf_author: document.author,
                        pdf_created_date: document.created_date,
                        ..Default::default()
                    });
                }
            }
            ContentKind::Json => {
                let bytes = page
                    .response_body()
                    .await
                    .map_err(|e| classify_driver_error(&e))?;
                self.check_body_size(bytes.len())?;

                let raw = String::from_utf8_lossy(&bytes).into_owned();
                // Pretty-print when it parses; unparseable bodies pass
                // through as text.
                let text = serde_json::from_str::<serde_json::Value>(&raw)
                    .ok()
                    .and_then(|value| serde_json::to_string_pretty(&value).ok())
                    .unwrap_or(raw);
                if request.extract_text {
                    result.content_text = Some(text);
                }
            }
            ContentKind::Text => {
                let bytes = page
                    .response_body()
                    .await
                    .map_err(|e| classify_driver_error(&e))?;
                self.check_body_size(bytes.len())?;

                if request.extract_text {
                    result.content_text = Some(String::from_utf8_lossy(&bytes).into_owned());
                }
            }
            ContentKind::Image => {
                if request.extract_metadata {
                    result.metadata = Some(PageMetadata::default());
                }
            }
            ContentKind::Other => {
                return Err(FetchError::of(
                    FetchErrorKind::UnsupportedContentType,
                    format!("no handler for content type {mime:?}"),
                ));
            }
        }

        if request.screenshot {
            let png = page
                .screenshot()
                .await
                .map_err(|e| classify_driver_error(&e))?;
            result.screenshot_base64 =
                Some(base64::engine::general_purpose::STANDARD.encode(png));
        }

        Ok(result)
    }

    /// Effective attempt deadline: the request override clamped to the
    /// configured page timeout.
    fn effective_timeout(&self, request: &FetchRequest) -> Duration {
        let page_timeout = self.browser_config.page_timeout_ms;
        Duration::from_millis(request.timeout_ms.unwrap_or(page_timeout).min(page_timeout))
    }

    fn check_body_size(&self, len: usize) -> Result<(), FetchError> {
        if len > self.fetch_config.max_fetch_bytes {
            return Err(FetchError::of(
                FetchErrorKind::ContentTooLarge,
                format!(
                    "response body of {len} bytes exceeds cap of {} bytes",
                    self.fetch_config.max_fetch_bytes
                ),
            ));
        }
        Ok(())
    }

    /// Exponential backoff with a small uniform jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.fetch_config.retry_base_delay_ms;
        let exp = base.saturating_mul(2u64.saturating_pow(attempt));
        let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MS);
        Duration::from_millis(exp.saturating_add(jitter)).min(MAX_BACKOFF)
    }

    /// Whether the driver behind this fetcher is up.
    pub fn browser_connected(&self) -> bool {
        self.driver.is_connected()
    }

    /// The engine the driver runs.
    pub fn browser_engine(&self) -> crate::config::BrowserType {
        self.driver.engine()
    }
}

fn validate_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        FetchError::of(FetchErrorKind::InvalidUrl, format!("invalid URL {raw:?}: {e}"))
    })?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FetchError::of(
                FetchErrorKind::InvalidUrl,
                format!("unsupported URL scheme {scheme:?}"),
            ));
        }
    }

    if url.host_str().is_none() {
        return Err(FetchError::of(
            FetchErrorKind::InvalidUrl,
            format!("URL {raw:?} has no host"),
        ));
    }

    Ok(url)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::NoopDriver;
    use crate::config::BrowserType;

    fn test_fetcher(config: &Config) -> Fetcher {
        Fetcher::new(
            Arc::new(NoopDriver::new(BrowserType::Chromium)),
            Arc::new(ResponseCache::disabled()),
            Arc::new(DomainRateLimiter::new(None, &config.rate_limit)),
            Arc::new(RobotsPolicy::new(
                config.robots.clone(),
                config.browser.user_agent.clone(),
                None,
            )),
            config,
        )
    }

    #[test]
    fn request_timeout_is_clamped_to_page_timeout() {
        let config = Config::default();
        let fetcher = test_fetcher(&config);

        let mut request = FetchRequest::new("https://example.com");
        assert_eq!(
            fetcher.effective_timeout(&request),
            Duration::from_millis(30_000)
        );

        request.timeout_ms = Some(5_000);
        assert_eq!(
            fetcher.effective_timeout(&request),
            Duration::from_millis(5_000)
        );

        request.timeout_ms = Some(120_000);
        assert_eq!(
            fetcher.effective_timeout(&request),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn rejects_non_http_schemes() {
        for raw in ["ftp://x", "file:///etc/passwd", "javascript:alert(1)"] {
            let error = validate_url(raw).unwrap_err();
            assert_eq!(error.kind, FetchErrorKind::InvalidUrl, "for {raw:?}");
            assert!(!error.retryable);
        }
    }

    #[test]
    fn rejects_malformed_urls() {
        let error = validate_url("not a url at all").unwrap_err();
        assert_eq!(error.kind, FetchErrorKind::InvalidUrl);
    }

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("https://example.com/path?q=1").is_ok());
    }
}
