//! Backoff retrier for fallible remote calls.
//!
//! Retries transient failures with exponential backoff and jitter, bounded
//! by a max-attempt count and a max delay. Classification lives with the
//! error ([`RetryClass`]), not here, so the retrier stays vendor-agnostic.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use rand::Rng;

use crate::error::RetryClass;

/// Retry behavior for one wrapped operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the initial attempt. 3 retries = up to 4 invocations.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry `n` (1-indexed), without jitter:
    /// `min(max_delay_ms, base_delay_ms * 2^(n-1))`.
    pub fn delay_for_retry(&self, n: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(n.saturating_sub(1)).unwrap_or(u64::MAX));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }
}

/// Observability hook invoked before each retry sleep with the retry
/// number (1-indexed), the computed delay, and the triggering error.
/// No control-flow effect.
pub type RetryHook<'a, E> = &'a (dyn Fn(u32, Duration, &E) + Send + Sync);

/// Apply ±20% jitter. Jitter is what prevents synchronized retry storms
/// across concurrent jobs; do not remove it without a documented reason.
fn with_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

/// Run `operation`, retrying retryable failures with exponential backoff.
///
/// Non-retryable failures propagate immediately with zero delay. After
/// `max_retries` exhausted retryable failures, the last error itself is
/// returned — never a wrapper that hides the cause.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    on_retry: Option<RetryHook<'_, E>>,
    mut operation: F,
) -> Result<T, E>
where
    E: RetryClass,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt > config.max_retries {
                    return Err(err);
                }
                let delay = with_jitter(config.delay_for_retry(attempt));
                if let Some(hook) = on_retry {
                    // The hook must never abort the retry loop.
                    let _ = std::panic::catch_unwind(AssertUnwindSafe(|| {
                        hook(attempt, delay, &err)
                    }));
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::error::ProviderError;

    fn rate_limited() -> ProviderError {
        ProviderError::http("stub", 429, "rate limited")
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_invoke_operation_exactly_max_plus_one_times() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(
            &RetryConfig {
                max_retries: 3,
                base_delay_ms: 1_000,
                max_delay_ms: 30_000,
            },
            None,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // The last error itself is raised, unmodified.
        let err = result.unwrap_err();
        assert_eq!(err.status, Some(429));
        assert_eq!(err.message, "rate limited");
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let started = std::time::Instant::now();
        let result: Result<(), _> = retry_with_backoff(
            &RetryConfig::default(),
            None,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::http("stub", 400, "bad input")) }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
        // Zero delay: no backoff sleep happened.
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failure_and_reports_each_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let hook_calls = Arc::new(AtomicU32::new(0));

        let op_calls = Arc::clone(&calls);
        let seen = Arc::clone(&hook_calls);
        let hook = move |n: u32, delay: Duration, _err: &ProviderError| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(n, 1);
            // First retry: base delay with ±20% jitter.
            assert!(delay >= Duration::from_millis(800));
            assert!(delay <= Duration::from_millis(1_200));
        };

        let result = retry_with_backoff(&RetryConfig::default(), Some(&hook), || {
            let calls = Arc::clone(&op_calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(rate_limited())
                } else {
                    Ok("audio-bytes")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "audio-bytes");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_hook_does_not_abort_the_retry_loop() {
        let calls = Arc::new(AtomicU32::new(0));
        let op_calls = Arc::clone(&calls);
        let hook = |_: u32, _: Duration, _: &ProviderError| panic!("bad hook");

        let result = retry_with_backoff(&RetryConfig::default(), Some(&hook), || {
            let calls = Arc::clone(&op_calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(rate_limited())
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
    }

    #[test]
    fn delay_doubles_and_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 5_000,
        };
        assert_eq!(config.delay_for_retry(1), Duration::from_millis(1_000));
        assert_eq!(config.delay_for_retry(2), Duration::from_millis(2_000));
        assert_eq!(config.delay_for_retry(3), Duration::from_millis(4_000));
        assert_eq!(config.delay_for_retry(4), Duration::from_millis(5_000));
        assert_eq!(config.delay_for_retry(10), Duration::from_millis(5_000));
    }
}
