//! HTTP surface tests driven through the router

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{build_fetcher, test_config, StubDriver, StubResponse};
use http_body_util::BodyExt;
use iris::browser::NoopDriver;
use iris::cache::ResponseCache;
use iris::config::BrowserType;
use iris::fetch::Fetcher;
use iris::limiter::DomainRateLimiter;
use iris::robots::RobotsPolicy;
use iris::server::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::util::ServiceExt;

const PAGE: &str = "<html><head><title>T</title></head><body>\
    <article><p>hello from the api test page, with enough words.</p></article>\
    </body></html>";

fn app_with_driver(driver: Arc<StubDriver>) -> (axum::Router, Arc<ResponseCache>) {
    let config = test_config();
    let (fetcher, cache) = build_fetcher(driver, &config);
    let state = AppState {
        fetcher,
        cache: cache.clone(),
        started_at: Instant::now(),
    };
    (create_router(state), cache)
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn fetch_returns_extracted_result() {
    let driver = StubDriver::new();
    driver.enqueue("https://example.com/", StubResponse::html(PAGE));
    let (app, _cache) = app_with_driver(driver);

    let response = app
        .oneshot(json_request("/fetch", json!({"url": "https://example.com/"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status_code"], 200);
    assert_eq!(body["metadata"]["title"], "T");
    assert_eq!(body["cached"], false);
    assert!(body["content_text"]
        .as_str()
        .unwrap()
        .contains("hello from the api test page"));
}

#[tokio::test]
async fn fetch_carries_errors_in_the_body() {
    let driver = StubDriver::new();
    let (app, _cache) = app_with_driver(driver);

    let response = app
        .oneshot(json_request("/fetch", json!({"url": "ftp://x"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_url");
    assert_eq!(body["error"]["retryable"], false);
}

#[tokio::test]
async fn malformed_fetch_bodies_are_unprocessable() {
    let driver = StubDriver::new();
    let (app, _cache) = app_with_driver(driver);

    // Missing the required url field
    let response = app
        .oneshot(json_request("/fetch", json!({"screenshot": true})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn batch_of_ten_is_accepted_and_ordered() {
    let driver = StubDriver::new();
    let requests: Vec<Value> = (0..10)
        .map(|i| {
            let url = format!("https://host{i}.example/");
            driver.enqueue(&url, StubResponse::html(PAGE));
            json!({"url": url})
        })
        .collect();
    let (app, _cache) = app_with_driver(driver);

    let response = app
        .oneshot(json_request("/batch", json!({"requests": requests})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 10);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(
            result["url"],
            format!("https://host{i}.example/"),
            "results must come back in request order"
        );
    }
    assert!(body["total_time_ms"].is_number());
}

#[tokio::test]
async fn batch_of_eleven_is_rejected() {
    let driver = StubDriver::new();
    let requests: Vec<Value> = (0..11)
        .map(|i| json!({"url": format!("https://host{i}.example/")}))
        .collect();
    let (app, _cache) = app_with_driver(driver);

    let response = app
        .oneshot(json_request("/batch", json!({"requests": requests})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_BATCH_SIZE");
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let driver = StubDriver::new();
    let (app, _cache) = app_with_driver(driver);

    let response = app
        .oneshot(json_request("/batch", json!({"requests": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn health_reports_browser_and_cache() {
    let driver = StubDriver::new();
    let (app, _cache) = app_with_driver(driver);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "iris");
    assert_eq!(body["browser"]["up"], true);
    assert_eq!(body["browser"]["type"], "chromium");
    assert_eq!(body["cache"]["up"], true);
    assert!(body["uptime_seconds"].is_number());
}

#[tokio::test]
async fn cache_delete_is_idempotent_and_validates_the_hash() {
    let driver = StubDriver::new();
    let (app, _cache) = app_with_driver(driver);

    let hash = "a".repeat(64);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/cache/{hash}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/cache/not-a-hash")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_delete_then_refetch_is_a_miss() {
    let driver = StubDriver::new();
    driver.enqueue("https://example.com/", StubResponse::html(PAGE));
    let (app, _cache) = app_with_driver(driver);

    let fetch_body = json!({"url": "https://example.com/"});

    let first = app
        .clone()
        .oneshot(json_request("/fetch", fetch_body.clone()))
        .await
        .unwrap();
    assert_eq!(body_json(first).await["cached"], false);

    let second = app
        .clone()
        .oneshot(json_request("/fetch", fetch_body.clone()))
        .await
        .unwrap();
    assert_eq!(body_json(second).await["cached"], true);

    let request: iris::fetch::FetchRequest =
        serde_json::from_value(fetch_body.clone()).unwrap();
    let hash = iris::cache::fingerprint(&request);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/cache/{hash}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let third = app.oneshot(json_request("/fetch", fetch_body)).await.unwrap();
    assert_eq!(body_json(third).await["cached"], false);
}

#[tokio::test]
async fn fetch_without_a_browser_is_a_server_error() {
    let config = test_config();
    let cache = Arc::new(ResponseCache::in_memory(&config.cache));
    let limiter = Arc::new(DomainRateLimiter::new(None, &config.rate_limit));
    let robots = Arc::new(RobotsPolicy::new(
        config.robots.clone(),
        config.browser.user_agent.clone(),
        None,
    ));
    let fetcher = Arc::new(Fetcher::new(
        Arc::new(NoopDriver::new(BrowserType::Chromium)),
        cache.clone(),
        limiter,
        robots,
        &config,
    ));
    let app = create_router(AppState {
        fetcher,
        cache,
        started_at: Instant::now(),
    });

    let response = app
        .oneshot(json_request("/fetch", json!({"url": "https://example.com/"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], "BROWSER_UNAVAILABLE");
}
