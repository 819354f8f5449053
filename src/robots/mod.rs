//! robots.txt policy cache
//!
//! One entry per origin. Raw bodies are cached in Redis (`robots:{origin}`)
//! with a long TTL; parsed rule tables live in an in-process LRU. Every
//! failure mode (network error, non-2xx, cross-scheme redirect) fails open
//! with an allow-all sentinel on a shorter TTL so a flaky origin is neither
//! blocked nor hammered.

use lru::LruCache;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::config::RobotsConfig;

const KEY_PREFIX: &str = "robots:";

/// TTL for the allow-all sentinel cached after a failed fetch
const FAILURE_TTL: Duration = Duration::from_secs(3600);

/// robots.txt fetches get a short deadline so a slow origin cannot stall
/// the pipeline
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Redirects followed when fetching robots.txt, same scheme only
const MAX_REDIRECTS: usize = 2;

/// Parsed rules for one origin
#[derive(Debug, Clone)]
pub struct RobotsEntry {
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<Duration>,
    fetched_at: Instant,
    ttl: Duration,
}

impl RobotsEntry {
    /// Parse robots.txt content for a user agent. A group naming the agent
    /// specifically replaces wildcard-group rules.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let ua_lower = user_agent.to_lowercase();
        let mut disallow = Vec::new();
        let mut allow = Vec::new();
        let mut crawl_delay = None;
        let mut current_group_applies = false;
        let mut found_specific_group = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    let agent = value.to_lowercase();
                    if agent == "*" {
                        current_group_applies = !found_specific_group;
                    } else if ua_lower.contains(&agent) || agent.contains(&ua_lower) {
                        current_group_applies = true;
                        if !found_specific_group {
                            // Specific group takes over from wildcard rules
                            disallow.clear();
                            allow.clear();
                            crawl_delay = None;
                            found_specific_group = true;
                        }
                    } else {
                        current_group_applies = false;
                    }
                }
                "disallow" if current_group_applies && !value.is_empty() => {
                    disallow.push(value.to_string());
                }
                "allow" if current_group_applies && !value.is_empty() => {
                    allow.push(value.to_string());
                }
                "crawl-delay" if current_group_applies => {
                    if let Ok(secs) = value.parse::<f64>() {
                        if secs.is_finite() && secs >= 0.0 {
                            crawl_delay = Some(Duration::from_secs_f64(secs));
                        }
                    }
                }
                _ => {}
            }
        }

        Self {
            disallow,
            allow,
            crawl_delay,
            fetched_at: Instant::now(),
            ttl: Duration::ZERO, // set by the caller
        }
    }

    /// The allow-all sentinel cached when robots.txt cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            disallow: Vec::new(),
            allow: Vec::new(),
            crawl_delay: None,
            fetched_at: Instant::now(),
            ttl: FAILURE_TTL,
        }
    }

    /// Crawl-delay requested for the configured user agent, if any.
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }

    fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Longest-match-wins across allow and disallow; allow wins ties.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest_allow = self
            .allow
            .iter()
            .filter(|p| Self::path_matches(path, p))
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        let longest_disallow = self
            .disallow
            .iter()
            .filter(|p| Self::path_matches(path, p))
            .map(|p| p.len())
            .max()
            .unwrap_or(0);

        longest_allow >= longest_disallow
    }

    pub fn is_valid(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }

    /// Match a path against a robots.txt pattern with `*` wildcards and an
    /// optional `$` end anchor.
    fn path_matches(path: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }

        let (body, anchored) = match pattern.strip_suffix('$') {
            Some(stripped) => (stripped, true),
            None => (pattern, false),
        };

        Self::segments_match(path, body, anchored)
    }

    /// Recursive descent over the pattern: the literal before the first `*`
    /// must match in place, then the `*` is tried against every span of the
    /// remaining path. Patterns are short, so the backtracking is cheap.
    fn segments_match(path: &str, pattern: &str, anchored: bool) -> bool {
        let Some((literal, rest)) = pattern.split_once('*') else {
            // No wildcards left: a plain prefix, or an exact match when
            // the pattern was `$`-anchored.
            return if anchored {
                path == pattern
            } else {
                path.starts_with(pattern)
            };
        };

        let Some(remaining) = path.strip_prefix(literal) else {
            return false;
        };

        (0..=remaining.len())
            .filter(|&i| remaining.is_char_boundary(i))
            .any(|i| Self::segments_match(&remaining[i..], rest, anchored))
    }
}

/// robots.txt policy with per-origin caching and fail-open semantics
pub struct RobotsPolicy {
    config: RobotsConfig,
    user_agent: String,
    http: reqwest::Client,
    redis: Option<ConnectionManager>,
    entries: Mutex<LruCache<String, Arc<RobotsEntry>>>,
}

impl RobotsPolicy {
    pub fn new(
        config: RobotsConfig,
        user_agent: String,
        redis: Option<ConnectionManager>,
    ) -> Self {
        // Follow at most two redirects and never across schemes; anything
        // else counts as a failed fetch and fails open.
        let redirect_policy = reqwest::redirect::Policy::custom(|attempt| {
            let same_scheme = attempt
                .previous()
                .first()
                .map(|first| first.scheme() == attempt.url().scheme())
                .unwrap_or(true);
            if attempt.previous().len() > MAX_REDIRECTS || !same_scheme {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(redirect_policy)
            .user_agent(user_agent.clone())
            .build()
            .unwrap_or_default();

        let capacity = NonZeroUsize::new(1024).expect("static capacity is non-zero");

        Self {
            config,
            user_agent,
            http,
            redis,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Decide whether `url` may be fetched for the configured user agent.
    pub async fn allowed(&self, url: &Url) -> bool {
        if !self.config.respect_robots_txt {
            return true;
        }

        let origin = url.origin().ascii_serialization();
        let entry = self.entry_for(&origin, url.scheme()).await;
        entry.is_allowed(url.path())
    }

    /// Crawl-delay declared by `url`'s origin for the configured user
    /// agent. The rate limiter clamps and applies it.
    pub async fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        if !self.config.respect_robots_txt {
            return None;
        }

        let origin = url.origin().ascii_serialization();
        self.entry_for(&origin, url.scheme()).await.crawl_delay()
    }

    async fn entry_for(&self, origin: &str, scheme: &str) -> Arc<RobotsEntry> {
        if let Some(entry) = self.entries.lock().get(origin) {
            if entry.is_valid() {
                return entry.clone();
            }
        }

        let ttl = Duration::from_secs(self.config.cache_ttl_secs);

        // Redis holds raw bodies so restarts and sibling processes share
        // fetched rules.
        if let Some(content) = self.redis_get(origin).await {
            let entry = Arc::new(RobotsEntry::parse(&content, &self.user_agent).with_ttl(ttl));
            self.entries.lock().put(origin.to_string(), entry.clone());
            return entry;
        }

        let robots_url = format!("{origin}/robots.txt");
        let entry = match self.fetch_robots(&robots_url, scheme).await {
            Some(content) => {
                self.redis_put(origin, &content).await;
                Arc::new(RobotsEntry::parse(&content, &self.user_agent).with_ttl(ttl))
            }
            None => Arc::new(RobotsEntry::allow_all()),
        };

        self.entries.lock().put(origin.to_string(), entry.clone());
        entry
    }

    /// Fetch robots.txt. `None` means "could not get an authoritative
    /// answer" and the caller fails open.
    async fn fetch_robots(&self, robots_url: &str, scheme: &str) -> Option<String> {
        let response = match self.http.get(robots_url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = robots_url, error = %e, "robots.txt fetch failed; allowing");
                return None;
            }
        };

        // A stopped redirect surfaces here as a 3xx status
        if !response.status().is_success() {
            debug!(
                url = robots_url,
                status = response.status().as_u16(),
                "robots.txt not available; allowing"
            );
            return None;
        }

        if response.url().scheme() != scheme {
            debug!(url = robots_url, "robots.txt redirected across schemes; allowing");
            return None;
        }

        response.text().await.ok()
    }

    async fn redis_get(&self, origin: &str) -> Option<String> {
        let manager = self.redis.as_ref()?;
        let mut conn = manager.clone();
        match conn
            .get::<_, Option<String>>(format!("{KEY_PREFIX}{origin}"))
            .await
        {
            Ok(content) => content,
            Err(e) => {
                debug!(origin, error = %e, "robots store read failed");
                None
            }
        }
    }

    async fn redis_put(&self, origin: &str, content: &str) {
        let Some(manager) = self.redis.as_ref() else {
            return;
        };
        let mut conn = manager.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(
                format!("{KEY_PREFIX}{origin}"),
                content,
                self.config.cache_ttl_secs,
            )
            .await
        {
            debug!(origin, error = %e, "robots store write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(content: &str, agent: &str) -> RobotsEntry {
        RobotsEntry::parse(content, agent).with_ttl(Duration::from_secs(60))
    }

    #[test]
    fn specific_agent_group_replaces_wildcard() {
        let content = "\
User-agent: *\n\
Disallow: /private/\n\
\n\
User-agent: Iris\n\
Disallow: /admin/\n";

        let entry = parsed(content, "Iris/0.1 (+research fetcher)");
        assert!(!entry.is_allowed("/admin/settings"));
        // Wildcard rules were replaced by the specific group
        assert!(entry.is_allowed("/private/page"));
        assert!(entry.is_allowed("/public"));
    }

    #[test]
    fn longest_match_wins_and_allow_wins_ties() {
        let content = "\
User-agent: *\n\
Disallow: /private/\n\
Allow: /private/public/\n";

        let entry = parsed(content, "TestBot");
        assert!(!entry.is_allowed("/private/secret"));
        assert!(entry.is_allowed("/private/public/page"));
        assert!(entry.is_allowed("/elsewhere"));
    }

    #[test]
    fn wildcard_and_anchor_patterns() {
        let content = "\
User-agent: *\n\
Disallow: /*.pdf$\n\
Disallow: /tmp/*/draft\n";

        let entry = parsed(content, "TestBot");
        assert!(!entry.is_allowed("/docs/manual.pdf"));
        assert!(entry.is_allowed("/docs/manual.pdf?inline=1"));
        assert!(entry.is_allowed("/docs/manual.html"));
        assert!(!entry.is_allowed("/tmp/2024/draft"));
    }

    #[test]
    fn path_matching_basics() {
        assert!(RobotsEntry::path_matches("/admin/x", "/admin/"));
        assert!(!RobotsEntry::path_matches("/public/x", "/admin/"));
        assert!(RobotsEntry::path_matches("/images/cat.jpg", "/images/*.jpg"));
        assert!(RobotsEntry::path_matches("/page.html", "/page.html$"));
        assert!(!RobotsEntry::path_matches("/page.html?q", "/page.html$"));
        assert!(!RobotsEntry::path_matches("/anything", ""));
    }

    #[test]
    fn crawl_delay_is_parsed_per_group() {
        let content = "\
User-agent: *\n\
Crawl-delay: 2\n\
\n\
User-agent: Iris\n\
Crawl-delay: 0.5\n";

        let wildcard = parsed(content, "SomeOtherBot");
        assert_eq!(wildcard.crawl_delay(), Some(Duration::from_secs(2)));

        // The specific group replaces the wildcard delay
        let specific = parsed(content, "Iris/0.1 (+research fetcher)");
        assert_eq!(specific.crawl_delay(), Some(Duration::from_millis(500)));

        let absent = parsed("User-agent: *\nDisallow: /x\n", "TestBot");
        assert_eq!(absent.crawl_delay(), None);
    }

    #[test]
    fn invalid_crawl_delays_are_ignored() {
        for value in ["abc", "-3", "inf"] {
            let content = format!("User-agent: *\nCrawl-delay: {value}\n");
            let entry = parsed(&content, "TestBot");
            assert_eq!(entry.crawl_delay(), None, "for {value:?}");
        }
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let content = "\
# global rules\n\
User-agent: *   # everyone\n\
\n\
Disallow: /secret\n";

        let entry = parsed(content, "TestBot");
        assert!(!entry.is_allowed("/secret/page"));
        assert!(entry.is_allowed("/open"));
    }

    #[test]
    fn sentinel_allows_everything_and_expires() {
        let entry = RobotsEntry::allow_all();
        assert!(entry.is_allowed("/anything"));
        assert!(entry.is_valid());

        let expired = RobotsEntry::allow_all().with_ttl(Duration::ZERO);
        assert!(!expired.is_valid());
    }
}
