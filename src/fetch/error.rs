//! Fetch error taxonomy and classification
//!
//! Driver failures arrive as free-form payloads (CDP error strings, network
//! stack messages); they are mapped onto a closed set of kinds with fixed
//! retryability so the retry loop never has to inspect messages.

use serde::{Deserialize, Serialize};

use crate::browser::DriverError;

/// Classification of fetch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    DnsError,
    ConnectionError,
    SslError,
    BlockedByRobotsTxt,
    RateLimited,
    UnsupportedContentType,
    InvalidUrl,
    HttpError,
    ContentTooLarge,
    BrowserError,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::DnsError => "dns_error",
            Self::ConnectionError => "connection_error",
            Self::SslError => "ssl_error",
            Self::BlockedByRobotsTxt => "blocked_by_robots_txt",
            Self::RateLimited => "rate_limited",
            Self::UnsupportedContentType => "unsupported_content_type",
            Self::InvalidUrl => "invalid_url",
            Self::HttpError => "http_error",
            Self::ContentTooLarge => "content_too_large",
            Self::BrowserError => "browser_error",
        }
    }

    /// Default retryability for this kind. `HttpError` varies by status and
    /// is decided in [`classify_http_status`].
    fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::DnsError | Self::ConnectionError | Self::RateLimited
        )
    }
}

/// Structured error information carried in a [`super::FetchResult`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchError {
    #[serde(rename = "type")]
    pub kind: FetchErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl FetchError {
    /// An error of `kind` with its default retryability.
    pub fn of(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.default_retryable(),
            http_status: None,
        }
    }
}

/// Map a driver failure onto the error taxonomy.
///
/// SSL indicators are checked before connection indicators: TLS handshake
/// failures often mention the connection as well.
pub fn classify_driver_error(err: &DriverError) -> FetchError {
    if let DriverError::Timeout(_) = err {
        return FetchError::of(FetchErrorKind::Timeout, err.to_string());
    }

    let message = err.to_string();
    let lower = message.to_ascii_lowercase();

    let kind = if lower.contains("timeout") || lower.contains("timed out") {
        FetchErrorKind::Timeout
    } else if lower.contains("err_name_not_resolved")
        || lower.contains("dns")
        || lower.contains("getaddrinfo")
        || lower.contains("name resolution")
        || lower.contains("name or service not known")
    {
        FetchErrorKind::DnsError
    } else if lower.contains("ssl")
        || lower.contains("err_cert")
        || lower.contains("certificate")
        || lower.contains("handshake")
    {
        FetchErrorKind::SslError
    } else if lower.contains("err_connection")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("connection aborted")
        || lower.contains("connection closed")
        || lower.contains("econnrefused")
    {
        FetchErrorKind::ConnectionError
    } else {
        FetchErrorKind::BrowserError
    };

    FetchError::of(kind, message)
}

/// Classify an HTTP status of 400 or above.
///
/// 429 maps to `rate_limited`; bad-gateway-family statuses (502, 503, 504)
/// are the only retryable `http_error`s.
pub fn classify_http_status(status: u16) -> FetchError {
    if status == 429 {
        let mut error = FetchError::of(FetchErrorKind::RateLimited, "HTTP 429 Too Many Requests");
        error.http_status = Some(status);
        return error;
    }

    FetchError {
        kind: FetchErrorKind::HttpError,
        message: format!("HTTP {status}"),
        retryable: matches!(status, 502 | 503 | 504),
        http_status: Some(status),
    }
}
