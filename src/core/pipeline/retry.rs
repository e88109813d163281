//! Bounded retry with exponential backoff for store calls

use crate::config::schema::RetryConfig;
use crate::domain::{PhimaskError, Result};
use crate::log_retry_attempt;
use std::future::Future;
use std::time::Duration;

/// Retry policy applied to every store call of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    call_timeout: Duration,
}

impl RetryPolicy {
    /// Build the policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
            call_timeout: Duration::from_secs(config.store_timeout_secs),
        }
    }

    /// Maximum attempts per call, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, given `attempt` failed (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Run `op` until it succeeds, fails permanently or the budget runs out
    ///
    /// Each attempt is bounded by the store timeout; a timeout counts as a
    /// transient failure. Only [`PhimaskError::is_transient`] errors are
    /// retried.
    ///
    /// # Errors
    ///
    /// Non-transient errors are returned unchanged. Exhausting the budget
    /// returns `PhimaskError::RunFailure`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(PhimaskError::TransientStore(format!(
                    "{operation} timed out after {}s",
                    self.call_timeout.as_secs()
                ))),
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    tracing::error!(
                        operation,
                        attempts = attempt,
                        error = %e,
                        "Retry budget exhausted"
                    );
                    return Err(PhimaskError::RunFailure(format!(
                        "{operation} failed after {attempt} attempts: {e}"
                    )));
                }
                Err(e) => {
                    let delay = self.backoff(attempt);
                    log_retry_attempt!(
                        operation,
                        attempt,
                        self.max_attempts,
                        delay.as_millis() as u64,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use test_case::test_case;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            store_timeout_secs: 1,
        })
    }

    #[test_case(1, 100 ; "first retry uses base")]
    #[test_case(2, 200 ; "second doubles")]
    #[test_case(4, 800 ; "fourth")]
    #[test_case(5, 1_000 ; "capped at max")]
    #[test_case(30, 1_000 ; "stays capped")]
    fn test_backoff(attempt: u32, expected_ms: u64) {
        assert_eq!(policy(5).backoff(attempt), Duration::from_millis(expected_ms));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = policy(5)
            .run("read_range", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(PhimaskError::TransientStore("dropped".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_run_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = policy(3)
            .run("upsert_many", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(PhimaskError::Connection("reset".to_string())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PhimaskError::RunFailure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = policy(5)
            .run("count", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(PhimaskError::Database("syntax".to_string())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PhimaskError::Database(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = policy(3)
            .run("save_checkpoint", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    Ok("saved")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "saved");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
