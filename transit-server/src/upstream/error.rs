//! Upstream adapter error types.

use serde::Serialize;

/// Coarse classification of an upstream failure, reported alongside
/// degraded data instead of being raised to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// The request exceeded its timeout
    Timeout,
    /// Missing or rejected credential
    Unauthorized,
    /// The payload could not be parsed
    Malformed,
    /// Rate limited, either by the upstream or by our own request gate
    RateLimited,
    /// Network failure or unexpected HTTP status
    Unavailable,
}

/// Errors from a single upstream request.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Request timed out
    #[error("upstream request timed out")]
    Timeout,

    /// Invalid API key or unauthorized
    #[error("unauthorized: check OTD_API_KEY")]
    Unauthorized,

    /// Payload could not be parsed
    #[error("malformed payload: {message}")]
    Malformed { message: String },

    /// Rate limited by the upstream API
    #[error("rate limited by upstream API")]
    RateLimited,

    /// HTTP request failed (connection refused, DNS, ...)
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// API returned an error status code
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl UpstreamError {
    pub fn malformed(message: impl Into<String>) -> Self {
        UpstreamError::Malformed {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> UpstreamErrorKind {
        match self {
            UpstreamError::Timeout => UpstreamErrorKind::Timeout,
            UpstreamError::Unauthorized => UpstreamErrorKind::Unauthorized,
            UpstreamError::Malformed { .. } => UpstreamErrorKind::Malformed,
            UpstreamError::RateLimited => UpstreamErrorKind::RateLimited,
            UpstreamError::Http(_) | UpstreamError::Api { .. } => UpstreamErrorKind::Unavailable,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Http(err)
        }
    }
}

impl From<roxmltree::Error> for UpstreamError {
    fn from(err: roxmltree::Error) -> Self {
        UpstreamError::malformed(format!("XML: {err}"))
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::malformed(format!("JSON: {err}"))
    }
}

/// A single record that could not be converted. The record is skipped;
/// the rest of the payload is kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Failed to parse a timestamp
    #[error("invalid time: {0}")]
    InvalidTime(String),
}
