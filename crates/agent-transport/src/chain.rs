//! HTTP client chain: the circuit breaker wrapping the retry policy wrapping
//! the transport core, plus a thin logging decorator.

use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::breaker::{BreakerStatus, CircuitBreaker, CircuitBreakerConfig};
use crate::core::TransportCore;
use crate::error::TransportError;
use crate::retry::RetryPolicy;

/// A single request-issuing object: every call flows through the circuit
/// breaker, the retry policy, and the transport core, in that order — the
/// breaker sits outermost so it can fail fast without spending a retry
/// budget on a call it already knows will be rejected.
pub struct HttpClientChain {
    core: TransportCore,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl HttpClientChain {
    pub fn new(base_url: Url, api_key: &str) -> Result<Self, TransportError> {
        Ok(HttpClientChain {
            core: TransportCore::new(base_url, api_key)?,
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        })
    }

    pub async fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status().await
    }

    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, TransportError> {
        let result = self
            .breaker
            .execute(|| self.retry.execute(|| self.core.execute(method.clone(), path, body)))
            .await;
        self.log_failure(&method, path, &result);
        result
    }

    pub async fn execute_discard(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<(), TransportError> {
        let result = self
            .breaker
            .execute(|| {
                self.retry
                    .execute(|| self.core.execute_discard(method.clone(), path, body))
            })
            .await;
        self.log_failure(&method, path, &result);
        result
    }

    /// Log failing requests at error when the status is unknown or ≥500;
    /// stay silent otherwise so the application layer is the sole owner of
    /// contextual logging for 4xx.
    fn log_failure<T>(&self, method: &Method, path: &str, result: &Result<T, TransportError>) {
        if let Err(err) = result {
            let loud = match err.status() {
                Some(status) => status >= 500,
                None => true,
            };
            if loud {
                tracing::error!(method = %method, path, error = %err, "control-plane call failed");
            }
        }
    }
}
