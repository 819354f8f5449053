//! Cache, rate-limit, and robots.txt configuration

use serde::{Deserialize, Serialize};

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the response cache
    pub enabled: bool,
    /// Entry lifetime (seconds)
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3_600,
        }
    }
}

/// Per-domain rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum delay between requests to the same registrable domain (ms)
    pub min_delay_ms: u64,
    /// Token bucket capacity
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1_000,
            burst: 3,
        }
    }
}

/// robots.txt policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsConfig {
    /// Consult robots.txt before fetching
    pub respect_robots_txt: bool,
    /// Lifetime of cached robots.txt rule tables (seconds)
    pub cache_ttl_secs: u64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            respect_robots_txt: true,
            cache_ttl_secs: 86_400,
        }
    }
}
