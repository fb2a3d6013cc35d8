//! Circuit breaker: a three-state fail-fast wrapper around an async call.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

struct State {
    status: BreakerStatus,
    failure_count: u32,
    success_count: u32,
    next_attempt_at: Option<Instant>,
    /// At most one probe call is admitted while `HalfOpen`; set when that
    /// probe is let through and cleared once its outcome is recorded.
    half_open_probe_in_flight: bool,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        CircuitBreaker {
            config,
            state: Mutex::new(State {
                status: BreakerStatus::Closed,
                failure_count: 0,
                success_count: 0,
                next_attempt_at: None,
                half_open_probe_in_flight: false,
            }),
        }
    }

    pub async fn status(&self) -> BreakerStatus {
        self.state.lock().await.status
    }

    /// Wrap `f`. Fails fast with [`TransportError::CircuitOpen`] while `OPEN`
    /// and the recovery timeout has not elapsed, without invoking `f` at all.
    pub async fn execute<T, F, Fut>(&self, f: F) -> Result<T, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        if !self.admit().await {
            return Err(TransportError::CircuitOpen);
        }

        let outcome = match tokio::time::timeout(self.config.call_timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        self.record(&outcome).await;
        outcome
    }

    /// Decide whether a call may proceed, transitioning `OPEN` → `HALF_OPEN`
    /// on the first admitted call after `next_attempt_at`. While `HalfOpen`,
    /// only one probe call is admitted at a time; concurrent callers racing
    /// the recovery window are refused until that probe's outcome lands.
    async fn admit(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.status {
            BreakerStatus::Closed => true,
            BreakerStatus::HalfOpen => {
                if state.half_open_probe_in_flight {
                    false
                } else {
                    state.half_open_probe_in_flight = true;
                    true
                }
            }
            BreakerStatus::Open => {
                let ready = state
                    .next_attempt_at
                    .is_some_and(|deadline| Instant::now() >= deadline);
                if ready {
                    state.status = BreakerStatus::HalfOpen;
                    state.success_count = 0;
                    state.half_open_probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Only a genuine success or a counted failure moves the breaker's
    /// state; an error that doesn't count toward the breaker (most 4xx)
    /// leaves `failure_count`/`success_count` untouched so it can neither
    /// mask a real string of server failures nor pass as a recovery probe.
    async fn record<T>(&self, outcome: &Result<T, TransportError>) {
        match outcome {
            Ok(_) => self.record_success().await,
            Err(err) if err.counts_toward_breaker() => self.record_failure().await,
            Err(_) => self.release_half_open_probe().await,
        }
    }

    async fn release_half_open_probe(&self) {
        self.state.lock().await.half_open_probe_in_flight = false;
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.half_open_probe_in_flight = false;
        match state.status {
            BreakerStatus::Closed => {
                state.failure_count = 0;
            }
            BreakerStatus::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    state.status = BreakerStatus::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.next_attempt_at = None;
                }
            }
            BreakerStatus::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.half_open_probe_in_flight = false;
        match state.status {
            BreakerStatus::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    state.status = BreakerStatus::Open;
                    state.next_attempt_at = Some(Instant::now() + self.config.recovery_timeout);
                }
            }
            BreakerStatus::HalfOpen => {
                state.status = BreakerStatus::Open;
                state.success_count = 0;
                state.next_attempt_at = Some(Instant::now() + self.config.recovery_timeout);
            }
            BreakerStatus::Open => {}
        }
    }
}
