use std::future::Future;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

/// Bounded retry with exponential backoff. Only errors classified as retryable are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            jitter_factor: 0.25,
        }
    }

    /// No retries at all.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay after the given (0-indexed) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.saturating_mul(2u32.pow(attempt.min(10)));
        let capped = base.min(self.max_delay);
        if self.jitter_factor == 0.0 {
            return capped;
        }
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * self.jitter_factor;
        capped.mul_f64((1.0 + jitter).max(0.0))
    }

    /// `attempt` is 0-indexed.
    pub fn should_retry(&self, attempt: u32, error: &Error) -> bool {
        attempt + 1 < self.max_attempts && error.is_retryable()
    }
}

/// Runs `operation` until it succeeds, fails with a fatal error, or the policy is exhausted.
/// The attempt number (0-indexed) is passed to each invocation.
pub async fn retry<F, T, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(err) if policy.should_retry(attempt, &err) => {
                let delay = policy.delay_for_attempt(attempt);
                debug!(
                    "attempt {} failed, retrying in {:?}: {}",
                    attempt + 1,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
