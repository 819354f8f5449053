//! Chromium driver via chromiumoxide
//!
//! One long-lived browser process; pages are created per fetch attempt and
//! closed on every exit path. The main-document response (status, headers,
//! content type) is captured from CDP `Network.responseReceived` events,
//! and raw bodies are pulled with `Network.getResponseBody`.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as OxideConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams, Headers, RequestId, ResourceType, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{BrowserConfig, BrowserType};

use super::{BrowserDriver, BrowserPage, DriverError, NavigateUntil, PageResponse};

/// How long the network must stay quiet to count as idle
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Poll interval for selector and idle waits
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Long-lived Chromium process behind the driver trait
pub struct ChromiumDriver {
    browser: tokio::sync::Mutex<Browser>,
    handler_task: JoinHandle<()>,
    connected: Arc<AtomicBool>,
    user_agent: String,
}

impl ChromiumDriver {
    /// Launch a headless (or headful) Chromium and start its event loop.
    pub async fn launch(config: &BrowserConfig) -> Result<Self, DriverError> {
        let mut builder = OxideConfig::builder();
        if !config.headless {
            builder = builder.with_head();
        }
        let oxide_config = builder.build().map_err(DriverError::Browser)?;

        let (browser, mut handler) = Browser::launch(oxide_config)
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let connected_flag = connected.clone();
        // The handler stream must be driven for the browser to make progress;
        // it ends when the browser process goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            connected_flag.store(false, Ordering::SeqCst);
            warn!("browser event loop ended");
        });

        debug!(headless = config.headless, "chromium launched");

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            handler_task,
            connected,
            user_agent: config.user_agent.clone(),
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, DriverError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))?;

        page.set_user_agent(self.user_agent.as_str())
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))?;

        let in_flight = Arc::new(AtomicI64::new(0));
        let tracker = spawn_request_tracker(&page, in_flight.clone()).await?;

        Ok(Box::new(ChromiumPage {
            page: Some(page),
            in_flight,
            tracker,
            main_request_id: None,
        }))
    }

    fn engine(&self) -> BrowserType {
        BrowserType::Chromium
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        self.connected.store(false, Ordering::SeqCst);
        self.browser
            .lock()
            .await
            .close()
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))?;
        self.handler_task.abort();
        Ok(())
    }
}

/// Keeps an in-flight request counter current for network-idle waits
async fn spawn_request_tracker(
    page: &Page,
    in_flight: Arc<AtomicI64>,
) -> Result<JoinHandle<()>, DriverError> {
    let mut started = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| DriverError::Browser(e.to_string()))?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(|e| DriverError::Browser(e.to_string()))?;
    let mut failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(|e| DriverError::Browser(e.to_string()))?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                event = started.next() => match event {
                    Some(_) => { in_flight.fetch_add(1, Ordering::SeqCst); }
                    None => break,
                },
                event = finished.next() => match event {
                    Some(_) => { in_flight.fetch_sub(1, Ordering::SeqCst); }
                    None => break,
                },
                event = failed.next() => match event {
                    Some(_) => { in_flight.fetch_sub(1, Ordering::SeqCst); }
                    None => break,
                },
            }
        }
    }))
}

struct ChromiumPage {
    /// Taken by the explicit close; Drop spawns cleanup for whatever is
    /// left (client-canceled requests never reach close)
    page: Option<Page>,
    in_flight: Arc<AtomicI64>,
    tracker: JoinHandle<()>,
    /// Request id of the captured main-document response
    main_request_id: Option<RequestId>,
}

impl ChromiumPage {
    /// The live page handle (a cloneable CDP session reference).
    fn page(&self) -> Result<Page, DriverError> {
        self.page
            .clone()
            .ok_or_else(|| DriverError::Browser("page already closed".to_string()))
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn set_extra_headers(
        &mut self,
        headers: &HashMap<String, String>,
    ) -> Result<(), DriverError> {
        if headers.is_empty() {
            return Ok(());
        }
        let map: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        self.page()?
            .execute(SetExtraHttpHeadersParams {
                headers: Headers::new(serde_json::Value::Object(map)),
            })
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))?;
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        until: NavigateUntil,
        timeout: Duration,
    ) -> Result<PageResponse, DriverError> {
        let page = self.page()?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))?;

        let navigation = async {
            page.goto(url)
                .await
                .map_err(|e| DriverError::Navigation(e.to_string()))?;
            // goto resolves at frame navigation; the load event is what the
            // `load` milestone contracts for. DomContentLoaded callers get
            // the DOM as soon as navigation lands.
            if until == NavigateUntil::Load {
                page.wait_for_navigation()
                    .await
                    .map_err(|e| DriverError::Navigation(e.to_string()))?;
            }
            Ok::<(), DriverError>(())
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| DriverError::Timeout(timeout))??;

        // The first Document-type response is the navigation response,
        // redirects included.
        let capture = tokio::time::timeout(Duration::from_secs(1), async {
            while let Some(event) = responses.next().await {
                if event.r#type == ResourceType::Document {
                    return Some(event);
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        match capture {
            Some(event) => {
                self.main_request_id = Some(event.request_id.clone());
                Ok(PageResponse {
                    final_url: event.response.url.clone(),
                    status_code: event.response.status as u16,
                    content_type: Some(event.response.mime_type.clone()),
                    headers: headers_to_pairs(&event.response.headers),
                })
            }
            // No response event (e.g. about: URLs); report what we can.
            None => Ok(PageResponse {
                final_url: page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| url.to_string()),
                status_code: 0,
                content_type: None,
                headers: Vec::new(),
            }),
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let page = self.page()?;
        let deadline = Instant::now() + timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        let mut quiet_since: Option<Instant> = None;
        loop {
            if self.in_flight.load(Ordering::SeqCst) <= 0 {
                let since = *quiet_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= NETWORK_IDLE_WINDOW {
                    return Ok(());
                }
            } else {
                quiet_since = None;
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        self.page()?
            .content()
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))
    }

    async fn response_body(&mut self) -> Result<Vec<u8>, DriverError> {
        let request_id = self
            .main_request_id
            .clone()
            .ok_or_else(|| DriverError::Browser("no captured response".to_string()))?;

        let response = self
            .page()?
            .execute(GetResponseBodyParams::new(request_id))
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))?;

        if response.base64_encoded {
            use base64::Engine as _;
            base64::engine::general_purpose::STANDARD
                .decode(response.body.as_bytes())
                .map_err(|e| DriverError::Browser(format!("response body decode: {e}")))
        } else {
            Ok(response.body.clone().into_bytes())
        }
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        self.page()?
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))
    }

    async fn close(mut self: Box<Self>) {
        self.tracker.abort();
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "failed to close page");
            }
        }
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.tracker.abort();
        // Reached with a live page only when the owning request was
        // canceled before the explicit close; spawn cleanup so the tab is
        // not leaked.
        if let Some(page) = self.page.take() {
            tokio::spawn(async move {
                if let Err(e) = page.close().await {
                    warn!(error = %e, "page cleanup after drop failed");
                }
            });
        }
    }
}

fn headers_to_pairs(headers: &Headers) -> Vec<(String, String)> {
    serde_json::to_value(headers)
        .ok()
        .and_then(|value| match value {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .map(|(k, v)| {
                        let value = match v {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, value)
                    })
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default()
}
