//! Transport-level oracle errors.
//!
//! These describe failures to *reach* the oracle (HTTP status, network,
//! malformed envelope). Failures to *understand* a reply live in
//! [`crate::structured::StructuredError`].

use std::time::Duration;

/// Error from an oracle HTTP call.
#[derive(Debug)]
pub struct LlmError {
    pub kind: LlmErrorKind,
    /// HTTP status code, if the request got that far
    pub status_code: Option<u16>,
    pub message: String,
    /// Value of a `Retry-After` header, if the provider sent one
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(status_code: u16, body: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            kind: classify_http_status(status_code),
            status_code: Some(status_code),
            message: body.into(),
            retry_after,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::NetworkError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::MalformedResponse, message)
    }

    /// Delay before the given retry attempt (0-based).
    ///
    /// Honors `Retry-After`; otherwise doubles a per-kind base delay,
    /// capped at 60 seconds.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after;
        }

        let base_secs: u64 = match self.kind {
            LlmErrorKind::RateLimited => 5,
            LlmErrorKind::ServerError => 2,
            _ => 1,
        };

        let delay = base_secs.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_secs(delay.min(60))
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for LlmError {}

/// Classification of oracle transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// 429
    RateLimited,
    /// 5xx
    ServerError,
    /// Other 4xx (auth, bad request). Retrying will not help.
    ClientError,
    /// Connection refused, DNS, request timeout
    NetworkError,
    /// The provider envelope itself could not be decoded
    MalformedResponse,
}

impl LlmErrorKind {
    /// Whether a retry with the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LlmErrorKind::RateLimited => "Rate limited",
            LlmErrorKind::ServerError => "Server error",
            LlmErrorKind::ClientError => "Client error",
            LlmErrorKind::NetworkError => "Network error",
            LlmErrorKind::MalformedResponse => "Malformed response",
        };
        f.write_str(label)
    }
}

/// Transport retry policy for [`super::OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Upper bound on total time spent retrying one request
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    pub fn should_retry(&self, error: &LlmError, attempt: u32) -> bool {
        error.kind.is_transient() && attempt < self.max_retries
    }
}

/// Map an HTTP status code to an error kind.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}
