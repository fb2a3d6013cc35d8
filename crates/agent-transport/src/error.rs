//! Error taxonomy for the transport chain.

use thiserror::Error;

/// An RFC 9457 (`application/problem+json`) error document, when the
/// upstream response declared that media type.
#[derive(Debug, Clone, Default)]
pub struct ProblemDetails {
    pub title: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The per-request deadline (default 30s) elapsed.
    #[error("request timed out")]
    Timeout,

    /// A non-2xx response. `body` is the parsed problem-document message or
    /// the raw (pretty-printed if JSON) response body.
    #[error("http {status}: {body}")]
    Http {
        status: u16,
        problem: Option<ProblemDetails>,
        body: String,
    },

    /// Underlying connection/protocol failure (DNS, TLS, reset, …).
    #[error("transport error: {0}")]
    Network(String),

    /// The breaker refused the call without invoking the inner callable.
    #[error("circuit breaker open")]
    CircuitOpen,
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 4xx other than 429 are non-transient and must not be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http { status, .. } => !(400..500).contains(status) || *status == 429,
            TransportError::Timeout | TransportError::Network(_) => true,
            TransportError::CircuitOpen => false,
        }
    }

    /// Only server/transport failures (and "no status" errors) count toward
    /// the breaker. A stream of 404s from a misconfigured path must not
    /// silence an otherwise healthy runtime.
    pub fn counts_toward_breaker(&self) -> bool {
        match self {
            TransportError::Http { status, .. } => *status >= 500,
            TransportError::Timeout | TransportError::Network(_) => true,
            TransportError::CircuitOpen => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}
