//! Configuration for Iris
//!
//! All settings come from `IRIS_`-prefixed environment variables so the
//! service can be configured entirely from its container environment.

mod browser;
mod fetch;
mod logging;
mod server;
mod stores;

pub use browser::{BrowserConfig, BrowserType};
pub use fetch::FetchConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use server::ServerConfig;
pub use stores::{CacheConfig, RateLimitConfig, RobotsConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Default user agent for all outgoing requests (navigation and robots.txt)
pub const DEFAULT_USER_AGENT: &str = "Iris/0.1 (+research fetcher)";

/// Environment variable prefix
const ENV_PREFIX: &str = "IRIS_";

/// Main configuration for the Iris service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Browser driver configuration
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Fetch pipeline configuration
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per-domain rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// robots.txt policy configuration
    #[serde(default)]
    pub robots: RobotsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Shared store URL (cache, rate-limit buckets, robots bodies)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Allow startup without a browser; use in-process store backends
    #[serde(default)]
    pub testing_mode: bool,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/4".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            browser: BrowserConfig::default(),
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            robots: RobotsConfig::default(),
            logging: LoggingConfig::default(),
            redis_url: default_redis_url(),
            testing_mode: false,
        }
    }
}

impl Config {
    /// Load configuration from `IRIS_`-prefixed environment variables.
    ///
    /// Parse failures are collected and reported together with validation
    /// errors so the operator can fix everything in one pass.
    pub fn from_env() -> Result<Self> {
        let mut errors: Vec<String> = Vec::new();
        let config = Self::read_env(&mut errors);

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        config.validate()?;
        Ok(config)
    }

    fn read_env(errors: &mut Vec<String>) -> Self {
        let defaults = Config::default();

        Config {
            server: ServerConfig {
                host: env_string("HOST", defaults.server.host),
                port: env_parse("PORT", defaults.server.port, errors),
            },
            browser: BrowserConfig {
                browser_type: env_parse("BROWSER_TYPE", defaults.browser.browser_type, errors),
                headless: env_bool("HEADLESS", defaults.browser.headless, errors),
                page_timeout_ms: env_parse(
                    "PAGE_TIMEOUT_MS",
                    defaults.browser.page_timeout_ms,
                    errors,
                ),
                wait_after_load_ms: env_parse(
                    "WAIT_AFTER_LOAD_MS",
                    defaults.browser.wait_after_load_ms,
                    errors,
                ),
                max_concurrent_pages: env_parse(
                    "MAX_CONCURRENT_PAGES",
                    defaults.browser.max_concurrent_pages,
                    errors,
                ),
                user_agent: env_string("USER_AGENT", defaults.browser.user_agent),
            },
            fetch: FetchConfig {
                max_content_length: env_parse(
                    "MAX_CONTENT_LENGTH",
                    defaults.fetch.max_content_length,
                    errors,
                ),
                max_fetch_bytes: env_parse(
                    "MAX_FETCH_BYTES",
                    defaults.fetch.max_fetch_bytes,
                    errors,
                ),
                max_retries: env_parse("MAX_RETRIES", defaults.fetch.max_retries, errors),
                retry_base_delay_ms: env_parse(
                    "RETRY_BASE_DELAY_MS",
                    defaults.fetch.retry_base_delay_ms,
                    errors,
                ),
            },
            cache: CacheConfig {
                enabled: env_bool("CACHE_ENABLED", defaults.cache.enabled, errors),
                ttl_seconds: env_parse("CACHE_TTL_SECONDS", defaults.cache.ttl_seconds, errors),
            },
            rate_limit: RateLimitConfig {
                min_delay_ms: env_parse(
                    "MIN_DELAY_BETWEEN_REQUESTS_MS",
                    defaults.rate_limit.min_delay_ms,
                    errors,
                ),
                burst: env_parse("RATE_LIMIT_BURST", defaults.rate_limit.burst, errors),
            },
            robots: RobotsConfig {
                respect_robots_txt: env_bool(
                    "RESPECT_ROBOTS_TXT",
                    defaults.robots.respect_robots_txt,
                    errors,
                ),
                cache_ttl_secs: env_parse(
                    "ROBOTS_TXT_CACHE_TTL",
                    defaults.robots.cache_ttl_secs,
                    errors,
                ),
            },
            logging: LoggingConfig {
                level: env_parse("LOG_LEVEL", defaults.logging.level, errors),
                format: env_parse("LOG_FORMAT", defaults.logging.format, errors),
            },
            redis_url: env_string("REDIS_URL", defaults.redis_url),
            testing_mode: env_bool("TESTING_MODE", defaults.testing_mode, errors),
        }
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass rather than playing whack-a-mole.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.port == 0 {
            errors.push("port must be between 1 and 65535".to_string());
        }

        if self.browser.max_concurrent_pages == 0 {
            errors.push("max_concurrent_pages must be positive".to_string());
        }
        if self.browser.page_timeout_ms == 0 {
            errors.push("page_timeout_ms must be positive".to_string());
        }
        if self.browser.user_agent.trim().is_empty() {
            errors.push("user_agent must not be empty".to_string());
        }

        if self.fetch.max_content_length == 0 {
            errors.push("max_content_length must be positive".to_string());
        }
        if self.fetch.max_fetch_bytes < self.fetch.max_content_length {
            errors.push(format!(
                "max_fetch_bytes ({}) must be >= max_content_length ({})",
                self.fetch.max_fetch_bytes, self.fetch.max_content_length
            ));
        }
        if self.fetch.max_retries > 10 {
            errors.push("max_retries must be <= 10".to_string());
        }

        if self.rate_limit.min_delay_ms == 0 {
            errors.push("min_delay_between_requests_ms must be positive".to_string());
        }
        if self.rate_limit.burst == 0 {
            errors.push("rate_limit_burst must be positive".to_string());
        }

        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            errors.push("cache_ttl_seconds must be positive when cache is enabled".to_string());
        }
        if self.robots.respect_robots_txt && self.robots.cache_ttl_secs == 0 {
            errors.push("robots_txt_cache_ttl must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

fn env_string(name: &str, default: String) -> String {
    match std::env::var(format!("{ENV_PREFIX}{name}")) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default,
    }
}

fn env_parse<T>(name: &str, default: T, errors: &mut Vec<String>) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(format!("{ENV_PREFIX}{name}")) {
        Ok(value) if !value.trim().is_empty() => match value.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(e) => {
                errors.push(format!("{ENV_PREFIX}{name}={value:?}: {e}"));
                default
            }
        },
        _ => default,
    }
}

fn env_bool(name: &str, default: bool, errors: &mut Vec<String>) -> bool {
    match std::env::var(format!("{ENV_PREFIX}{name}")) {
        Ok(value) if !value.trim().is_empty() => {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    errors.push(format!(
                        "{ENV_PREFIX}{name}={other:?}: expected a boolean (true/false/1/0)"
                    ));
                    default
                }
            }
        }
        _ => default,
    }
}
