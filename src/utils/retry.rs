//! Retry with exponential backoff.
//!
//! An explicit "invoke with policy" helper: the operation is a closure
//! producing a future, the policy says how many attempts to make and how
//! the delay grows. Only transient errors (see
//! [`AppError::is_transient`]) are retried; anything else surfaces
//! immediately. When attempts run out the last transient error is wrapped
//! in [`AppError::RetryExhausted`].

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::RetryConfig;

/// Backoff parameters for [`retry_with_policy`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
        }
    }
}

/// Invoke `op`, retrying transient failures with exponential backoff.
pub async fn retry_with_policy<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                log::warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.multiplier);
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                log::error!(
                    "All {} attempts failed; giving up: {}",
                    policy.max_attempts,
                    e
                );
                return Err(AppError::RetryExhausted {
                    attempts: policy.max_attempts,
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0u32);
        let result = retry_with_policy(&fast_policy(3), || {
            let n = calls.get() + 1;
            calls.set(n);
            async move {
                if n < 3 {
                    Err(AppError::api(503, "unavailable"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_terminal() {
        let calls = Cell::new(0u32);
        let result: Result<()> = retry_with_policy(&fast_policy(3), || {
            calls.set(calls.get() + 1);
            async { Err(AppError::api(429, "rate limited")) }
        })
        .await;

        assert_eq!(calls.get(), 3);
        assert!(matches!(
            result,
            Err(AppError::RetryExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_non_transient_errors_fail_fast() {
        let calls = Cell::new(0u32);
        let result: Result<()> = retry_with_policy(&fast_policy(5), || {
            calls.set(calls.get() + 1);
            async { Err(AppError::config("bad credentials")) }
        })
        .await;

        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
