//! Generic retry-with-backoff execution for a single unit of work.
//!
//! [`RetryController::execute`] drives an operation under a [`RetryPolicy`]:
//! transient failures are retried with exponential backoff, permanent
//! failures and cancellation stop the run immediately. The operation itself
//! must be idempotent or safely re-triggerable — the controller will invoke
//! it again after a transient failure.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ActivityError, ConveyorError, RetryError};

/// Backoff and attempt budget for one activity.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Wait after the first failed attempt.
    pub initial_interval: Duration,
    /// Multiplier applied per attempt: wait before attempt k+1 is
    /// `initial * coefficient^(k-1)`, capped at `maximum_interval`.
    pub backoff_coefficient: f64,
    /// Upper bound on any single wait.
    pub maximum_interval: Duration,
    /// Total invocation budget, counting the first attempt.
    pub maximum_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(2),
            maximum_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Check the policy invariants:
    /// `maximum_interval >= initial_interval`, `maximum_attempts >= 1`,
    /// `backoff_coefficient >= 1.0`.
    pub fn validate(&self) -> Result<(), ConveyorError> {
        if self.maximum_attempts < 1 {
            return Err(ConveyorError::InvalidPolicy(
                "maximum_attempts must be at least 1".into(),
            ));
        }
        if self.backoff_coefficient < 1.0 {
            return Err(ConveyorError::InvalidPolicy(format!(
                "backoff_coefficient must be >= 1.0, got {}",
                self.backoff_coefficient
            )));
        }
        if self.maximum_interval < self.initial_interval {
            return Err(ConveyorError::InvalidPolicy(
                "maximum_interval must be >= initial_interval".into(),
            ));
        }
        Ok(())
    }

    /// The wait after the given failed attempt (attempt count starts at 1):
    /// `min(initial * coefficient^(attempt-1), maximum_interval)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = scaled.min(self.maximum_interval.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Executes one operation under a retry policy.
pub struct RetryController;

impl RetryController {
    /// Invoke `op` until it succeeds, fails permanently, exhausts the
    /// attempt budget, or cancellation is observed.
    ///
    /// An in-flight invocation is always awaited to completion; the token is
    /// consulted before each new attempt and interrupts the backoff wait,
    /// never the attempt itself. `on_retry(upcoming_attempt, error,
    /// next_retry_at)` fires once per scheduled retry, before the wait.
    pub async fn execute<T, F, Fut, C>(
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut op: F,
        mut on_retry: C,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
        C: FnMut(u32, &ActivityError, DateTime<Utc>),
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(ActivityError::Permanent(msg)) => return Err(RetryError::Permanent(msg)),
                Err(err @ ActivityError::Transient(_)) => {
                    if attempt >= policy.maximum_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: err.message().to_string(),
                        });
                    }
                    if cancel.is_cancelled() {
                        return Err(RetryError::Cancelled);
                    }

                    let delay = policy.delay_for_attempt(attempt);
                    let next_retry_at = Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                    warn!(
                        attempt,
                        max_attempts = policy.maximum_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after backoff"
                    );
                    on_retry(attempt + 1, &err, next_retry_at);

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}
