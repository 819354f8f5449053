//! Response cache keyed by a deterministic request fingerprint
//!
//! Entries live in Redis under `fetch:cache:{sha256}`. Every store error is
//! logged and swallowed: reads degrade to misses, writes to no-ops, so an
//! unreachable store never breaks a fetch.

use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CacheConfig;
use crate::fetch::{FetchRequest, FetchResult, WaitStrategy};

const KEY_PREFIX: &str = "fetch:cache:";

/// Canonical fingerprint input. Field order is fixed by this struct; the
/// header map is reduced to a digest of its sorted entries, so the result
/// is independent of caller-side ordering.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    url: String,
    extract_text: bool,
    extract_links: bool,
    extract_metadata: bool,
    screenshot: bool,
    wait_strategy: WaitStrategy,
    wait_for_selector: Option<&'a str>,
    wait_after_load_ms: Option<u64>,
    headers_digest: String,
}

/// SHA-256 fingerprint of a request's cache identity.
pub fn fingerprint(request: &FetchRequest) -> String {
    let input = FingerprintInput {
        url: normalize_url(&request.url),
        extract_text: request.extract_text,
        extract_links: request.extract_links,
        extract_metadata: request.extract_metadata,
        screenshot: request.screenshot,
        wait_strategy: request.effective_wait_strategy(),
        wait_for_selector: request.wait_for_selector.as_deref(),
        wait_after_load_ms: request.wait_after_load_ms,
        headers_digest: headers_digest(&request.headers),
    };

    let canonical = serde_json::to_string(&input).expect("fingerprint input serializes");
    hex_digest(canonical.as_bytes())
}

/// Normalize a URL for fingerprinting: lowercased scheme/host and stripped
/// default ports come from the `url` crate's parser; on top of that the
/// fragment is dropped and query parameters are sorted.
fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        // Unparseable URLs still fingerprint deterministically
        return raw.trim().to_string();
    };

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    url.to_string()
}

fn headers_digest(headers: &HashMap<String, String>) -> String {
    let mut lines: Vec<String> = headers
        .iter()
        .map(|(k, v)| format!("{}={}", k.to_ascii_lowercase(), v))
        .collect();
    lines.sort();
    hex_digest(lines.join("\n").as_bytes())
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

enum Backend {
    Redis(ConnectionManager),
    Memory(Mutex<HashMap<String, (String, Instant)>>),
    Disabled,
}

/// Response cache with graceful degradation
pub struct ResponseCache {
    backend: Backend,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Connect to Redis. A failed connection degrades to a disabled cache
    /// rather than failing startup.
    pub async fn connect(redis_url: &str, config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("response cache disabled by configuration");
            return Self::disabled();
        }

        match open_redis(redis_url).await {
            Ok(manager) => {
                info!("response cache connected");
                Self::redis_backed(manager, config)
            }
            Err(e) => {
                warn!(error = %e, "cache store unreachable; responses will not be cached");
                Self::disabled()
            }
        }
    }

    /// A cache over an already-open Redis connection.
    pub fn redis_backed(manager: ConnectionManager, config: &CacheConfig) -> Self {
        Self {
            backend: Backend::Redis(manager),
            ttl: Duration::from_secs(config.ttl_seconds),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// A process-local cache, used in testing mode.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(HashMap::new())),
            ttl: Duration::from_secs(config.ttl_seconds),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
            ttl: Duration::ZERO,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Whether a backing store is available.
    pub fn is_connected(&self) -> bool {
        !matches!(self.backend, Backend::Disabled)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Look up a cached result. Store errors read as misses.
    pub async fn get(&self, key: &str) -> Option<FetchResult> {
        let raw = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.get::<_, Option<String>>(format!("{KEY_PREFIX}{key}")).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(key, error = %e, "cache get failed");
                        None
                    }
                }
            }
            Backend::Memory(map) => {
                let mut map = map.lock();
                match map.get(key) {
                    Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
                    Some(_) => {
                        map.remove(key);
                        None
                    }
                    None => None,
                }
            }
            Backend::Disabled => None,
        };

        let parsed = raw.and_then(|data| match serde_json::from_str::<FetchResult>(&data) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(key, error = %e, "cache entry failed to deserialize; treating as miss");
                None
            }
        });

        match parsed {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result. Results carrying an error are never stored.
    pub async fn put(&self, key: &str, result: &FetchResult) {
        if result.error.is_some() {
            return;
        }

        let data = match serde_json::to_string(result) {
            Ok(data) => data,
            Err(e) => {
                warn!(key, error = %e, "cache serialize failed");
                return;
            }
        };

        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                if let Err(e) = conn
                    .set_ex::<_, _, ()>(format!("{KEY_PREFIX}{key}"), data, self.ttl.as_secs())
                    .await
                {
                    warn!(key, error = %e, "cache set failed");
                } else {
                    debug!(key, ttl_secs = self.ttl.as_secs(), "cache set");
                }
            }
            Backend::Memory(map) => {
                map.lock()
                    .insert(key.to_string(), (data, Instant::now() + self.ttl));
            }
            Backend::Disabled => {}
        }
    }

    /// Remove an entry. Returns whether a stored entry was deleted.
    pub async fn invalidate(&self, key: &str) -> bool {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.del::<_, u64>(format!("{KEY_PREFIX}{key}")).await {
                    Ok(deleted) => deleted > 0,
                    Err(e) => {
                        warn!(key, error = %e, "cache invalidate failed");
                        false
                    }
                }
            }
            Backend::Memory(map) => map.lock().remove(key).is_some(),
            Backend::Disabled => false,
        }
    }
}

/// Open a Redis connection manager and verify it responds.
pub async fn open_redis(redis_url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let client = redis::Client::open(redis_url)?;
    let mut manager = ConnectionManager::new(client).await?;
    redis::cmd("PING").query_async::<_, ()>(&mut manager).await?;
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str) -> FetchRequest {
        FetchRequest::new(url)
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = fingerprint(&request("https://example.com/page"));
        let b = fingerprint(&request("https://example.com/page"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_ignores_header_order() {
        let mut a = request("https://example.com");
        a.headers.insert("X-One".to_string(), "1".to_string());
        a.headers.insert("X-Two".to_string(), "2".to_string());

        let mut b = request("https://example.com");
        b.headers.insert("X-Two".to_string(), "2".to_string());
        b.headers.insert("X-One".to_string(), "1".to_string());

        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_distinguishes_flags() {
        let base = request("https://example.com");
        let mut with_screenshot = base.clone();
        with_screenshot.screenshot = true;
        assert_ne!(fingerprint(&base), fingerprint(&with_screenshot));

        let mut with_links = base.clone();
        with_links.extract_links = true;
        assert_ne!(fingerprint(&base), fingerprint(&with_links));
    }

    #[test]
    fn fingerprint_uses_effective_wait_strategy() {
        let mut explicit = request("https://example.com");
        explicit.wait_strategy = WaitStrategy::Selector;
        explicit.wait_for_selector = Some("#app".to_string());

        let mut coerced = request("https://example.com");
        coerced.wait_strategy = WaitStrategy::Load;
        coerced.wait_for_selector = Some("#app".to_string());

        assert_eq!(fingerprint(&explicit), fingerprint(&coerced));
    }

    #[test]
    fn normalize_sorts_query_and_strips_fragment() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM:443/path?b=2&a=1#frag"),
            "https://example.com/path?a=1&b=2"
        );
    }

    #[test]
    fn normalize_strips_default_port_only() {
        assert_eq!(
            normalize_url("http://example.com:80/x"),
            "http://example.com/x"
        );
        assert_eq!(
            normalize_url("http://example.com:8080/x"),
            "http://example.com:8080/x"
        );
    }

    #[tokio::test]
    async fn memory_cache_round_trips_and_invalidates() {
        let cache = ResponseCache::in_memory(&CacheConfig::default());
        let result = FetchResult {
            url: "https://example.com/".to_string(),
            status_code: 200,
            content_text: Some("hello".to_string()),
            content_length: 5,
            ..Default::default()
        };

        assert!(cache.get("k").await.is_none());
        cache.put("k", &result).await;
        let cached = cache.get("k").await.expect("entry stored");
        assert_eq!(cached, result);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);

        assert!(cache.invalidate("k").await);
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn errors_are_never_stored() {
        use crate::fetch::{FetchError, FetchErrorKind};

        let cache = ResponseCache::in_memory(&CacheConfig::default());
        let result = FetchResult::failure(
            "https://example.com/",
            0,
            FetchError::of(FetchErrorKind::Timeout, "deadline exceeded"),
            10,
        );
        cache.put("k", &result).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_is_a_no_op() {
        let cache = ResponseCache::disabled();
        let result = FetchResult::default();
        cache.put("k", &result).await;
        assert!(cache.get("k").await.is_none());
        assert!(!cache.invalidate("k").await);
        assert!(!cache.is_connected());
    }
}
