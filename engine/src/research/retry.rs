//! Retry with exponential backoff
//!
//! A small reusable policy: a fixed number of attempts, an exponential delay
//! between them, and a caller-supplied predicate deciding which errors are
//! worth another attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Attempt budget and backoff base for a retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after `failed_attempt` (1-based) fails: `base * 2^(n-1)`
    pub fn backoff_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Sum of all delays a fully failing operation waits through
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|n| self.backoff_after(n))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

/// Run `operation` until it succeeds, the error is not retryable, or the
/// policy's attempts are used up.
///
/// The closure receives the 1-based attempt number. The first attempt runs
/// immediately. On exhaustion the last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= max_attempts || !is_retryable(&e) {
                    return Err(e);
                }

                let backoff = policy.backoff_after(attempt);
                tracing::warn!(
                    attempt = attempt,
                    max = max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after failed attempt"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
