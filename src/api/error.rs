//! Error taxonomy for Planning Center API calls
//!
//! Every non-2xx response is classified into exactly one [`ApiError`] variant
//! before it reaches the caller. Transport failures are mapped onto
//! `Network`/`Timeout` so no reqwest type leaks through the public API.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use super::constants;

pub type Result<T> = std::result::Result<T, ApiError>;

/// The unified error type for the client
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed credentials, invalid pagination arguments, bad config files
    #[error("configuration error: {0}")]
    Configuration(String),

    /// HTTP 401, or a token endpoint that refused the client credentials
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// HTTP 403
    #[error("not authorized: {message}")]
    Authorization { message: String },

    /// HTTP 404
    #[error("resource not found: {message}")]
    NotFound { message: String },

    /// HTTP 400 / 422 with the server-provided details
    #[error("validation failed ({status}): {message}")]
    Validation {
        status: u16,
        message: String,
        details: Vec<ErrorDetail>,
    },

    /// HTTP 429
    #[error("rate limited, retry after {}s: {message}", .retry_after.as_secs())]
    RateLimited {
        retry_after: Duration,
        message: String,
    },

    /// HTTP 5xx
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-2xx response, or a 2xx response whose body could not be parsed
    #[error("request failed{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    General {
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },

    /// Connection, DNS or TLS failure
    #[error("network error: {0}")]
    Network(String),

    /// A single HTTP attempt timed out
    #[error("request timed out")]
    Timeout,

    /// The caller's cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline for the whole logical call elapsed
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// The call is not valid in the current state (e.g. no next page)
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A query string could not be parsed back into a query description
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// One entry of a JSON:API `errors` array
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub source: Option<ErrorSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorSource {
    #[serde(default)]
    pub pointer: Option<String>,
    #[serde(default)]
    pub parameter: Option<String>,
}

impl ErrorDetail {
    /// Human readable text, preferring `detail` over `title`
    pub fn message(&self) -> Option<&str> {
        self.detail
            .as_deref()
            .or(self.title.as_deref())
            .filter(|m| !m.is_empty())
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

impl ApiError {
    /// Classify a non-2xx response
    ///
    /// `retry_after` is the raw `Retry-After` header value, if any. A missing or
    /// unparseable value falls back to `fallback_retry_after`.
    pub fn from_response(
        status: u16,
        retry_after: Option<&str>,
        body: &str,
        fallback_retry_after: Duration,
    ) -> Self {
        let details = parse_error_details(body);
        let message = details
            .iter()
            .find_map(|d| d.message())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_message(status, body));

        match status {
            401 => ApiError::Authentication { message },
            403 => ApiError::Authorization { message },
            404 => ApiError::NotFound { message },
            400 | 422 => ApiError::Validation {
                status,
                message,
                details,
            },
            429 => ApiError::RateLimited {
                retry_after: parse_retry_after(retry_after).unwrap_or(fallback_retry_after),
                message,
            },
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::General {
                status: Some(status),
                message,
                body: (!body.is_empty()).then(|| body.to_string()),
            },
        }
    }

    /// A 2xx body that was not the JSON we expected
    pub fn malformed(status: Option<u16>, error: impl std::fmt::Display, body: Option<String>) -> Self {
        ApiError::General {
            status,
            message: format!("malformed response body: {}", error),
            body,
        }
    }

    /// HTTP status the error was classified from, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Authentication { .. } => Some(401),
            ApiError::Authorization { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Validation { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::General { status, .. } => *status,
            _ => None,
        }
    }

    /// Server-recommended wait for rate limited responses
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Validation details sent by the server
    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            ApiError::Validation { details, .. } => details,
            _ => &[],
        }
    }

    /// Server errors and network/timeout failures; the only retryable kinds
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Server { .. } | ApiError::Network(_) | ApiError::Timeout
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, ApiError::Cancelled | ApiError::DeadlineExceeded(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .map(str::trim)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn parse_error_details(body: &str) -> Vec<ErrorDetail> {
    if body.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.errors)
        .unwrap_or_default()
}

fn fallback_message(status: u16, body: &str) -> String {
    // Some endpoints answer with `{"message": "..."}` instead of an errors array
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(message) = map.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status)
    } else {
        trimmed.chars().take(constants::MAX_ERROR_BODY_CHARS).collect()
    }
}
