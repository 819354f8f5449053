//! HTTP API request/response types
//!
//! The fetch request/result types live in [`crate::fetch::types`] and are
//! reused verbatim by the API; this module holds the envelope types.

use serde::{Deserialize, Serialize};

use crate::fetch::{FetchRequest, FetchResult};

/// Body for `POST /batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFetchRequest {
    /// Fetch requests, executed concurrently (1-10)
    pub requests: Vec<FetchRequest>,
}

/// Response for `POST /batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFetchResponse {
    /// Results in request order
    pub results: Vec<FetchResult>,
    /// Wall time for the whole batch (ms)
    pub total_time_ms: u64,
}

/// Browser section of the health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserHealth {
    /// Whether the browser process is up
    pub up: bool,
    /// Engine name (chromium, firefox, webkit)
    #[serde(rename = "type")]
    pub engine: String,
}

/// Cache section of the health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    /// Whether a backing store is reachable
    pub up: bool,
    pub hits: u64,
    pub misses: u64,
}

/// Response for `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub browser: BrowserHealth,
    pub cache: CacheHealth,
    pub uptime_seconds: f64,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
