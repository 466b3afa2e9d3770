//! Bounded retry with exponential backoff.
//!
//! [`execute`] runs an operation up to `max_retries + 1` times. Every attempt
//! is wrapped in a timeout; an expired attempt counts as a transient failure.
//! Errors are classified through [`PressError::kind`]: anything that is not
//! transient is returned at once without consuming the remaining attempts.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::anthropic::AnthropicError;
use crate::error::{PressError, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Budget for a single attempt, in milliseconds.
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            attempt_timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    /// delay = initial_delay_ms * multiplier^(attempt - 1), capped at max_delay_ms
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// The same policy with an attempt timeout no shorter than `timeout`.
    pub fn covering(mut self, timeout: Duration) -> Self {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.attempt_timeout_ms = self.attempt_timeout_ms.max(ms);
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Runs `operation` under `policy`, labelling logs and errors with `context`.
pub async fn execute<T, F, Fut>(mut operation: F, policy: &RetryPolicy, context: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total = policy.total_attempts();
    let mut attempt = 1;

    loop {
        let outcome = match timeout(policy.attempt_timeout(), operation()).await {
            Ok(result) => result,
            Err(_) => Err(PressError::Timeout {
                operation: context.to_string(),
                after: policy.attempt_timeout(),
            }),
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(context, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let kind = err.kind();
        if !kind.is_retryable() {
            warn!(context, attempt, %kind, error = %err, "not retrying");
            return Err(err);
        }

        if attempt >= total {
            warn!(context, attempts = attempt, error = %err, "retries exhausted");
            return Err(PressError::RetriesExhausted {
                context: context.to_string(),
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = delay_after(&err, policy, attempt);
        warn!(
            context,
            attempt,
            max = total,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, retrying"
        );
        sleep(delay).await;
        attempt += 1;
    }
}

// Rate-limited responses may ask for a longer pause than the backoff schedule.
fn delay_after(err: &PressError, policy: &RetryPolicy, attempt: u32) -> Duration {
    let scheduled = policy.delay_for_attempt(attempt);
    match err {
        PressError::Anthropic(AnthropicError::RateLimited { retry_after_ms }) => scheduled
            .max(Duration::from_millis(*retry_after_ms))
            .min(Duration::from_millis(policy.max_delay_ms)),
        _ => scheduled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            attempt_timeout_ms: 1_000,
        }
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            attempt_timeout_ms: 30_000,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(5000));
    }

    #[test]
    fn covering_only_widens_the_attempt_timeout() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.clone().covering(Duration::from_secs(180)).attempt_timeout(),
            Duration::from_secs(180)
        );
        assert_eq!(
            policy.covering(Duration::from_secs(5)).attempt_timeout(),
            Duration::from_secs(30)
        );
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = execute(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(PressError::service("search", ErrorKind::Transient, "flaky"))
                    } else {
                        Ok(n)
                    }
                }
            },
            &fast(3),
            "search",
        )
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_abort_immediately() {
        let calls = AtomicU32::new(0);
        let err = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(PressError::service("auth", ErrorKind::Fatal, "401")) }
            },
            &fast(5),
            "auth",
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, PressError::Service { .. }));
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn logic_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(PressError::Validation(vec!["no tags".into()])) }
            },
            &fast(5),
            "validate",
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::Logic);
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_cause_with_attempt_count() {
        let calls = AtomicU32::new(0);
        let err = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(PressError::Status {
                        service: "llm".into(),
                        status: 503,
                        message: "overloaded".into(),
                    })
                }
            },
            &fast(2),
            "complete",
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            PressError::RetriesExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, PressError::Status { status: 503, .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_attempts_time_out_as_transient() {
        let policy = RetryPolicy {
            attempt_timeout_ms: 10,
            ..fast(1)
        };
        let err = execute(
            || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            &policy,
            "fetch",
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        match err {
            PressError::RetriesExhausted { source, attempts, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, PressError::Timeout { .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[test]
    fn rate_limit_hint_extends_delay_within_cap() {
        let policy = RetryPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            ..RetryPolicy::default()
        };
        let err = PressError::Anthropic(AnthropicError::RateLimited {
            retry_after_ms: 10_000,
        });
        assert_eq!(delay_after(&err, &policy, 1), Duration::from_millis(2_000));
    }
}
