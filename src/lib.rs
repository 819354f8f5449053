//! Iris: web fetching and content-extraction service
//!
//! Retrieves arbitrary URLs through a headless browser and normalizes the
//! response into structured artifacts, exposed over a JSON HTTP API:
//! - Clean article text, metadata, links, JSON-LD and microdata
//! - PDF text and document metadata
//! - Full-page screenshots
//! - Per-domain token-bucket rate limiting with a Redis-backed bucket store
//! - robots.txt enforcement with fail-open caching
//! - A fingerprint-keyed response cache with graceful degradation

pub mod browser;
pub mod cache;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod limiter;
pub mod robots;
pub mod server;
pub mod util;

pub use config::Config;
