//! Per-domain token-bucket rate limiter
//!
//! Bucket state lives in Redis (`rate:bucket:{domain}`) and is updated by
//! an atomic Lua script so concurrent processes share one budget. When the
//! store is unreachable the acquire falls back to an in-process bucket for
//! the same domain. `acquire` suspends the caller until a token is granted.

use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use url::Url;

use crate::config::RateLimitConfig;

const KEY_PREFIX: &str = "rate:bucket:";

/// Cap on robots.txt crawl-delay overrides; some sites ask for minutes
const MAX_CRAWL_DELAY: Duration = Duration::from_secs(30);

/// Atomic check-and-consume. Returns 1 when a token was taken, otherwise
/// the negated wait in milliseconds until one becomes available.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local burst = tonumber(ARGV[3])

local data = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(data[1])
local last_refill = tonumber(data[2])

if tokens == nil then
    tokens = burst
    last_refill = now
end

local elapsed = now - last_refill
tokens = math.min(burst, tokens + elapsed * rate)

if tokens >= 1 then
    tokens = tokens - 1
    redis.call('HMSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 3600)
    return 1
else
    local wait = (1 - tokens) / rate
    redis.call('HMSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 3600)
    return -math.ceil(wait * 1000)
end
"#;

struct MemoryBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-domain token bucket with a distributed store and a local fallback
pub struct DomainRateLimiter {
    redis: Option<ConnectionManager>,
    script: redis::Script,
    min_delay: Duration,
    burst: u32,
    /// Fallback buckets; the per-domain mutex is a tokio mutex so waiters
    /// are served in arrival order.
    buckets: Mutex<HashMap<String, Arc<tokio::sync::Mutex<MemoryBucket>>>>,
}

impl DomainRateLimiter {
    pub fn new(redis: Option<ConnectionManager>, config: &RateLimitConfig) -> Self {
        if redis.is_none() {
            info!("rate limiter using in-process buckets");
        }
        Self {
            redis,
            script: redis::Script::new(TOKEN_BUCKET_SCRIPT),
            min_delay: Duration::from_millis(config.min_delay_ms),
            burst: config.burst.max(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire one token for `domain` at the configured rate, sleeping
    /// until it is available.
    pub async fn acquire(&self, domain: &str) {
        self.acquire_with_delay(domain, None).await
    }

    /// Acquire one token, honoring an origin-requested delay (robots.txt
    /// crawl-delay). The override is clamped between the configured minimum
    /// and [`MAX_CRAWL_DELAY`].
    pub async fn acquire_with_delay(&self, domain: &str, crawl_delay: Option<Duration>) {
        let delay = match crawl_delay {
            Some(requested) => requested.clamp(self.min_delay, MAX_CRAWL_DELAY),
            None => self.min_delay,
        };
        let rate = rate_per_sec(delay);

        if let Some(manager) = &self.redis {
            let mut conn = manager.clone();
            loop {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs_f64();

                let outcome: Result<i64, redis::RedisError> = self
                    .script
                    .key(format!("{KEY_PREFIX}{domain}"))
                    .arg(now)
                    .arg(rate)
                    .arg(self.burst)
                    .invoke_async(&mut conn)
                    .await;

                match outcome {
                    Ok(1) => return,
                    Ok(wait) => {
                        let wait_ms = wait.unsigned_abs();
                        debug!(domain, wait_ms, "rate limiting");
                        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                    }
                    Err(e) => {
                        debug!(domain, error = %e, "rate-limit store failed; using local bucket");
                        break;
                    }
                }
            }
        }

        self.acquire_memory(domain, rate).await;
    }

    async fn acquire_memory(&self, domain: &str, rate: f64) {
        let bucket = {
            let mut buckets = self.buckets.lock();
            buckets
                .entry(domain.to_string())
                .or_insert_with(|| {
                    Arc::new(tokio::sync::Mutex::new(MemoryBucket {
                        tokens: self.burst as f64,
                        last_refill: Instant::now(),
                    }))
                })
                .clone()
        };

        // Holding the bucket lock across the sleep serializes contended
        // acquires for one domain in arrival order.
        let mut bucket = bucket.lock().await;
        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * rate).min(self.burst as f64);
            bucket.last_refill = now;

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return;
            }

            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / rate);
            debug!(domain, wait_ms = wait.as_millis() as u64, "rate limiting");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Tokens refilled per second for a given inter-request delay.
fn rate_per_sec(delay: Duration) -> f64 {
    1000.0 / delay.as_millis().max(1) as f64
}

/// Registrable domain (eTLD+1) of a URL's host, used as the rate-limit key.
/// Hosts with no registrable suffix (IP literals, localhost) key on the
/// host itself.
pub fn registrable_domain(url: &Url) -> String {
    match url.host() {
        Some(url::Host::Domain(host)) => {
            let host = host.to_ascii_lowercase();
            psl::domain_str(&host).map(str::to_string).unwrap_or(host)
        }
        Some(ip) => ip.to_string(),
        None => String::new(),
    }
}
