//! Browser driver configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DEFAULT_USER_AGENT;

/// Browser engine used for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "webkit" => Ok(Self::Webkit),
            other => Err(format!(
                "unknown browser type {other:?} (expected chromium, firefox, or webkit)"
            )),
        }
    }
}

/// Browser driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Browser engine
    pub browser_type: BrowserType,
    /// Run without a visible window
    pub headless: bool,
    /// Default navigation + wait deadline (milliseconds)
    pub page_timeout_ms: u64,
    /// Default settle time after the wait strategy completes (milliseconds)
    pub wait_after_load_ms: u64,
    /// Maximum browser pages in flight
    pub max_concurrent_pages: usize,
    /// User agent applied to every page
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser_type: BrowserType::Chromium,
            headless: true,
            page_timeout_ms: 30_000,
            wait_after_load_ms: 2_000,
            max_concurrent_pages: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
