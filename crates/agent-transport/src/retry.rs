//! Retry policy: bounded exponential-backoff retry for transient failures.

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            backoff_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// Run `f` up to `max_retries` times. 4xx errors other than 429 are
    /// non-transient and propagate immediately without consuming a retry;
    /// everything else backs off `backoff_ms * 2^(attempt - 1)` between
    /// attempts.
    pub async fn execute<T, F, Fut>(&self, mut f: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.max_retries => return Err(err),
                Err(_err) => {
                    let backoff = self.backoff_ms.saturating_mul(1u64 << (attempt - 1));
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
    }
}
