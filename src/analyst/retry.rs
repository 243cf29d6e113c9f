//! Bounded retry with exponential backoff for analyst calls.
//!
//! Model endpoints fail transiently (HTTP 429/503, timeouts, a local model
//! still loading). [`RetryPolicy::run`] retries a call a fixed number of
//! times, sleeping `base_backoff * 2^(attempt-1)` between attempts, and
//! reports either the first success or [`AnalystError::Exhausted`]. Callers
//! above this layer only ever see those two outcomes.

use crate::error::AnalystError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Attempt count and backoff schedule for one analyst call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one; at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// A policy that tries once and never sleeps.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before attempt `attempt` (1-based); zero for the first.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_backoff.saturating_mul(factor)
    }

    /// Run `call` until it succeeds or the attempts are used up.
    ///
    /// `operation` names the call in logs and in the returned error.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, AnalystError>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_err = String::new();

        for attempt in 1..=self.max_attempts {
            let backoff = self.backoff_for(attempt);
            if !backoff.is_zero() {
                warn!(
                    "{}: retry {}/{} after {}ms",
                    operation,
                    attempt,
                    self.max_attempts,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_err = e.to_string();
                    warn!("{}: attempt {} failed: {}", operation, attempt, last_err);
                }
            }
        }

        Err(AnalystError::Exhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
            detail: last_err,
        })
    }
}
