//! Explicit retry-with-backoff helper.
//!
//! Callers wrap a closure in [`retry_with_policy`] instead of relying on any
//! implicit wrapping, keeping the control flow visible at every call site.
//! The delay between attempts multiplies by the backoff factor; the sleep is
//! the only pause point in the engine and nothing else proceeds during it.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Attempt budget and backoff shape for one retried operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay between consecutive attempts.
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and backoff shape.
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_factor,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Delay before the given attempt (attempts are numbered from 1; the
    /// first attempt has no delay).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.initial_delay
            .mul_f64(self.backoff_factor.powi(attempt as i32 - 2))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250), 2.0)
    }
}

/// Runs `op` until it succeeds or the attempt budget is exhausted, sleeping
/// the policy's backoff delay between attempts. Returns the last error when
/// every attempt fails.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(operation, attempt, error = %err, "Attempt failed");
                if attempt >= policy.max_attempts {
                    return Err(err);
                }
            }
        }

        attempt += 1;
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            debug!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying after backoff"
            );
        }
    }
}
