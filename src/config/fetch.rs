//! Fetch pipeline configuration

use serde::{Deserialize, Serialize};

/// Fetch pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum length of extracted text returned to callers (bytes)
    pub max_content_length: usize,
    /// Maximum raw response body accepted before extraction (bytes)
    pub max_fetch_bytes: usize,
    /// Retries after the initial attempt for retryable failures
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts (milliseconds)
    pub retry_base_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_content_length: 500_000,
            max_fetch_bytes: 10 * 1024 * 1024,
            max_retries: 2,
            retry_base_delay_ms: 500,
        }
    }
}
