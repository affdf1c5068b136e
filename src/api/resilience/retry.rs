//! Retry policies with linear or exponential backoff
//!
//! Only transient failures (server errors, network errors, timeouts) are
//! retried. Rate limited responses are retried only when explicitly allowed,
//! and then after the server's `Retry-After` wait.

use log::{debug, info, warn};
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::api::error::ApiError;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `base_delay * attempt`
    Linear,
    /// `base_delay * multiplier^(attempt - 1)`
    Exponential(f64),
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
    pub jitter: bool,
    pub retry_rate_limited: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Linear,
            jitter: false,
            retry_rate_limited: false,
        }
    }
}

impl RetryConfig {
    /// Conservative config for production
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            backoff: Backoff::Exponential(1.5),
            jitter: true,
            retry_rate_limited: false,
        }
    }

    /// Aggressive config for development/testing
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(60),
            backoff: Backoff::Exponential(2.5),
            jitter: true,
            retry_rate_limited: true,
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: Backoff::Linear,
            jitter: false,
            retry_rate_limited: false,
        }
    }
}

/// Bookkeeping for one logical call; never shared between calls
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    started: Instant,
}

impl RetryState {
    fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Retry policy wrapping any fallible async API call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    ///
    /// The first attempt runs immediately. Cancellation is observed both while
    /// an attempt is in flight and while waiting between attempts, and always
    /// surfaces as `ApiError::Cancelled`. When attempts run out the last error
    /// is returned as-is.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, operation: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut state = RetryState::new(&self.config);

        loop {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            state.attempt += 1;
            debug!("Executing operation (attempt {}/{})", state.attempt, state.max_attempts);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                outcome = operation() => outcome,
            };

            let error = match outcome {
                Ok(value) => {
                    if state.attempt > 1 {
                        info!(
                            "Operation succeeded after {} attempts ({:?})",
                            state.attempt,
                            state.elapsed()
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let delay = match self.retry_delay(&error, state.attempt) {
                Some(delay) if !state.exhausted() => delay,
                retryable => {
                    warn!(
                        "Operation failed permanently on attempt {} (retryable: {}): {}",
                        state.attempt,
                        retryable.is_some(),
                        error
                    );
                    return Err(error);
                }
            };

            warn!("Operation failed on attempt {} (retryable): {}", state.attempt, error);
            debug!("Waiting {:?} before retry", delay);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Wait before the next attempt, or `None` when the error is terminal
    pub fn retry_delay(&self, error: &ApiError, attempt: u32) -> Option<Duration> {
        match error {
            ApiError::RateLimited { retry_after, .. } if self.config.retry_rate_limited => Some(*retry_after),
            e if e.is_transient() => Some(self.calculate_delay(attempt)),
            _ => None,
        }
    }

    /// Backoff delay after the given (1-based) attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.base_delay.as_millis() as f64;
        let delay_ms = match self.config.backoff {
            Backoff::Linear => base_ms * attempt as f64,
            Backoff::Exponential(multiplier) => base_ms * multiplier.powi(attempt as i32 - 1),
        };

        let mut delay = Duration::from_millis(delay_ms as u64).min(self.config.max_delay);

        if self.config.jitter {
            let jitter_factor = rand::rng().random_range(0.5..=1.5);
            delay = Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64);
        }

        delay
    }
}
