//! HTTP API request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::cache::ResponseCache;
use crate::fetch::{FetchRequest, Fetcher, MAX_BATCH_SIZE};

use super::types::{
    BatchFetchRequest, BatchFetchResponse, BrowserHealth, CacheHealth, ErrorResponse,
    HealthResponse,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<Fetcher>,
    pub cache: Arc<ResponseCache>,
    pub started_at: Instant,
}

/// `POST /fetch`: fetch a single page.
///
/// Fetch failures are carried in the response body; only a missing browser
/// surfaces as an HTTP error.
pub async fn fetch_page(
    State(state): State<AppState>,
    Json(request): Json<FetchRequest>,
) -> impl IntoResponse {
    if !state.fetcher.browser_connected() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("BROWSER_UNAVAILABLE", "Browser is not running")),
        )
            .into_response();
    }

    debug!(url = %request.url, "fetch request");
    let result = state.fetcher.fetch(&request).await;
    Json(result).into_response()
}

/// `POST /batch`: fetch up to [`MAX_BATCH_SIZE`] pages concurrently.
pub async fn fetch_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchFetchRequest>,
) -> impl IntoResponse {
    if body.requests.is_empty() || body.requests.len() > MAX_BATCH_SIZE {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new(
                "INVALID_BATCH_SIZE",
                format!(
                    "batch must contain between 1 and {MAX_BATCH_SIZE} requests, got {}",
                    body.requests.len()
                ),
            )),
        )
            .into_response();
    }

    if !state.fetcher.browser_connected() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("BROWSER_UNAVAILABLE", "Browser is not running")),
        )
            .into_response();
    }

    debug!(count = body.requests.len(), "batch fetch request");
    let started = Instant::now();
    let results = state.fetcher.fetch_batch(&body.requests).await;

    Json(BatchFetchResponse {
        results,
        total_time_ms: started.elapsed().as_millis() as u64,
    })
    .into_response()
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "iris".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        browser: BrowserHealth {
            up: state.fetcher.browser_connected(),
            engine: state.fetcher.browser_engine().as_str().to_string(),
        },
        cache: CacheHealth {
            up: state.cache.is_connected(),
            hits: state.cache.hits(),
            misses: state.cache.misses(),
        },
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
    })
}

/// `DELETE /cache/{hash}`: drop one cache entry by fingerprint.
///
/// Idempotent: deleting an absent entry still returns 204.
pub async fn invalidate_cache(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> impl IntoResponse {
    if !is_sha256_hex(&hash) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "INVALID_HASH",
                "cache keys are 64 lowercase hex characters",
            )),
        )
            .into_response();
    }

    let deleted = state.cache.invalidate(&hash).await;
    debug!(hash, deleted, "cache invalidate");
    StatusCode::NO_CONTENT.into_response()
}

fn is_sha256_hex(hash: &str) -> bool {
    hash.len() == 64
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
