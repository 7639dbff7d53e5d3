//! Retry with a fixed delay
//!
//! One policy for every task of a run: a fixed number of attempts, a fixed
//! pause between them and an optional per-attempt timeout. Only retryable
//! error kinds (connection, load) earn another attempt.
//!
//! The timeout is applied by the caller through [`RetryPolicy::bounded`],
//! around the work itself, so time spent waiting for a concurrency slot
//! never counts against it.

use std::future::Future;
use std::time::Duration;

use crate::error::{EtlError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1)
    max_attempts: u32,
    delay: Duration,
    timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    /// 3 attempts, 5 minutes apart
    fn default() -> Self {
        Self::new(3, Duration::from_secs(300))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            timeout: None,
        }
    }

    /// Single attempt
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Bound each attempt; an expired attempt fails as a retryable timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether attempt number `attempt` (1-based) failing with `err` gets another go
    pub fn should_retry(&self, err: &EtlError, attempt: u32) -> bool {
        err.is_retryable() && attempt < self.max_attempts
    }

    /// Apply the per-attempt timeout, if any, to one attempt's work
    pub async fn bounded<T, Fut>(&self, task_id: &str, work: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .unwrap_or_else(|_| {
                    Err(EtlError::Timeout {
                        task: task_id.to_string(),
                        timeout: limit,
                    })
                }),
            None => work.await,
        }
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of
    /// attempts. `on_retry(attempt, error, delay)` fires before each pause.
    ///
    /// Returns the final result and the number of attempts made.
    pub async fn execute<F, Fut, T, R>(
        &self,
        mut operation: F,
        mut on_retry: R,
    ) -> (Result<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut(u32, &EtlError, Duration),
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(err) if self.should_retry(&err, attempt) => {
                    on_retry(attempt, &err, self.delay);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => return (Err(err), attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn connection_error() -> EtlError {
        EtlError::ConnectionFailed {
            reason: "reset".into(),
        }
    }

    #[test]
    fn defaults_are_three_attempts_five_minutes_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(300));
        assert_eq!(policy.timeout(), None);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut retries = Vec::new();
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let (result, attempts) = policy
            .execute(
                |_| {
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(connection_error())
                        } else {
                            Ok("done")
                        }
                    }
                },
                |attempt, _, _| retries.push(attempt),
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts, 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let (result, attempts) = policy
            .execute(|_| async { Err::<(), _>(connection_error()) }, |_, _, _| {})
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn assertion_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let (result, attempts) = policy
            .execute(
                |_| async { Err::<(), _>(EtlError::QualityCheckFailed { failures: vec![] }) },
                |_, _, _| panic!("must not retry"),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn timeout_counts_as_retryable_failure() {
        let policy = RetryPolicy::new(2, Duration::ZERO).with_timeout(Duration::from_millis(50));
        let (result, attempts) = policy
            .execute(
                |attempt| {
                    policy.bounded("slow_task", async move {
                        if attempt == 1 {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        Ok(attempt)
                    })
                },
                |_, err, _| assert!(matches!(err, EtlError::Timeout { .. })),
            )
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn bounded_without_timeout_waits_for_the_work() {
        let policy = RetryPolicy::no_retry();
        let value = policy
            .bounded("t", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(7)
            })
            .await;
        assert_eq!(value.unwrap(), 7);
    }
}
