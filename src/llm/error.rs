//! Typed errors for LLM calls.

use std::fmt;

use thiserror::Error;

/// Broad category of an LLM failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// 401/403 - bad or missing key
    Auth,
    /// 429 - provider throttling
    RateLimited,
    /// 5xx - upstream trouble
    Server,
    /// Other 4xx
    Client,
    /// Connection, DNS, TLS
    Network,
    /// Response did not have the expected shape
    InvalidResponse,
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::RateLimited => "rate_limited",
            Self::Server => "server",
            Self::Client => "client",
            Self::Network => "network",
            Self::InvalidResponse => "invalid_response",
        };
        f.write_str(s)
    }
}

/// An error from an LLM provider.
#[derive(Debug, Error)]
#[error(
    "LLM {} error{}: {}",
    .kind,
    .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default(),
    .message
)]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidResponse, None, message)
    }
}

/// Map an HTTP status code to an error category.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        401 | 403 => LlmErrorKind::Auth,
        429 => LlmErrorKind::RateLimited,
        500..=599 => LlmErrorKind::Server,
        _ => LlmErrorKind::Client,
    }
}
