//! Failure taxonomy and classification.
//!
//! Every attempt made against an upstream either succeeds or yields an
//! [`UpstreamError`]. [`classify`] maps that raw failure onto a
//! [`ClassifiedError`], whose `retryable` flag is fixed by its kind.

use std::fmt;
use thiserror::Error;

/// Category of a failed upstream attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Cancelled,
    RateLimited,
    ServerError,
    AuthError,
    InvalidRequest,
    NetworkError,
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::ServerError
                | ErrorKind::NetworkError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub status_code: Option<u16>,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            status_code,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, None, "operation cancelled")
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Raw outcome of a single failed attempt, as reported by an operation closure.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("attempt timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        UpstreamError::Status {
            status,
            body: body.into(),
        }
    }
}

/// Maps a raw attempt failure onto its kind. First match wins:
/// cancellation, timeout, 429, 5xx gateway family, 401/403, 400,
/// connection-level failure, anything else.
pub fn classify(err: &UpstreamError) -> ClassifiedError {
    let message = err.to_string();
    match err {
        UpstreamError::Cancelled => ClassifiedError::new(ErrorKind::Cancelled, None, message),
        UpstreamError::Timeout(_) => ClassifiedError::new(ErrorKind::Timeout, None, message),
        UpstreamError::Status { status, .. } => from_status(*status, message),
        UpstreamError::Connection(_) => {
            ClassifiedError::new(ErrorKind::NetworkError, None, message)
        }
        UpstreamError::Request(e) => classify_reqwest(e, message),
        UpstreamError::JsonParsing(_) | UpstreamError::MalformedResponse(_) => {
            ClassifiedError::new(ErrorKind::Unknown, None, message)
        }
        UpstreamError::Other(_) => classify_message(&message),
    }
}

fn from_status(status: u16, message: String) -> ClassifiedError {
    let kind = match status {
        429 => ErrorKind::RateLimited,
        500 | 502 | 503 | 504 => ErrorKind::ServerError,
        401 | 403 => ErrorKind::AuthError,
        400 => ErrorKind::InvalidRequest,
        _ => ErrorKind::Unknown,
    };
    ClassifiedError::new(kind, Some(status), message)
}

fn classify_reqwest(err: &reqwest::Error, message: String) -> ClassifiedError {
    if err.is_timeout() {
        return ClassifiedError::new(ErrorKind::Timeout, None, message);
    }
    if let Some(status) = err.status() {
        return from_status(status.as_u16(), message);
    }
    if err.is_connect() {
        return ClassifiedError::new(ErrorKind::NetworkError, None, message);
    }
    // Body/redirect/builder errors carry no structure worth trusting.
    classify_message(&message)
}

/// Last-resort classification for opaque errors that only expose a message.
///
/// Pattern matching follows the same precedence as [`classify`], so a message
/// mentioning both a timeout and a 500 is a `Timeout`: the request may never
/// have reached the server.
pub fn classify_message(message: &str) -> ClassifiedError {
    let lower = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    let (kind, status) = if has(&["cancelled", "canceled", "context canceled"]) {
        (ErrorKind::Cancelled, None)
    } else if has(&["timeout", "timed out", "deadline exceeded"]) {
        (ErrorKind::Timeout, None)
    } else if has(&["429", "too many requests", "rate limit"]) {
        (ErrorKind::RateLimited, Some(429))
    } else if let Some(code) = ["500", "502", "503", "504"]
        .into_iter()
        .find(|code| lower.contains(code))
    {
        (ErrorKind::ServerError, code.parse().ok())
    } else if has(&["401", "unauthorized"]) {
        (ErrorKind::AuthError, Some(401))
    } else if has(&["403", "forbidden"]) {
        (ErrorKind::AuthError, Some(403))
    } else if has(&["400", "bad request"]) {
        (ErrorKind::InvalidRequest, Some(400))
    } else if has(&[
        "connection refused",
        "connection reset",
        "no such host",
        "dns",
        "network is unreachable",
        "host is unreachable",
        "broken pipe",
    ]) {
        (ErrorKind::NetworkError, None)
    } else {
        (ErrorKind::Unknown, None)
    };

    ClassifiedError::new(kind, status, message)
}
