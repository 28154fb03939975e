//! Bounded exponential backoff for database operations.

use std::future::Future;

use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Execute an async operation with retry logic.
///
/// `operation` is called once per attempt, at most `config.max_retries + 1`
/// times. An error for which `is_retryable` returns false is returned
/// immediately; otherwise the loop sleeps for
/// [`RetryConfig::delay_for_attempt`] and tries again. The last error is
/// returned as-is once attempts run out.
pub async fn with_retry<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) => {
                if is_retryable(&error) && attempt + 1 < max_attempts {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        operation = operation_name,
                        error = %error,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable error, will retry after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                if attempt > 0 {
                    warn!(
                        operation = operation_name,
                        error = %error,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts"
                    );
                }
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use tokio::time::Instant;

    use super::*;

    fn config(max_retries: u32, initial_delay_ms: u64) -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_retries,
            initial_delay_ms,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let attempts = AtomicU32::new(0);

        let result: Result<i32, String> = with_retry(
            &config(3, 10),
            "test_op",
            |_| true,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retry() {
        let attempts = AtomicU32::new(0);

        let result: Result<i32, String> = with_retry(
            &config(3, 10),
            "test_op",
            |_| true,
            || {
                let count = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err("transient error".to_string())
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error_after_doubling_delays() {
        let attempts = AtomicU32::new(0);
        let started_at = Mutex::new(Vec::new());
        let start = Instant::now();

        let result: Result<i32, String> = with_retry(
            &config(2, 100),
            "test_op",
            |_| true,
            || {
                let count = attempts.fetch_add(1, Ordering::SeqCst);
                started_at.lock().unwrap().push(start.elapsed());
                async move { Err(format!("connection refused (attempt {count})")) }
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), "connection refused (attempt 2)");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let started_at = started_at.into_inner().unwrap();
        assert_eq!(
            started_at,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(300)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<i32, String> = with_retry(
            &config(5, 100),
            "test_op",
            |e: &String| !e.contains("permission denied"),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("permission denied for table items".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_disabled_makes_one_attempt() {
        let attempts = AtomicU32::new(0);

        let result: Result<i32, String> = with_retry(
            &RetryConfig::disabled(),
            "test_op",
            |_| true,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("connection refused".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
