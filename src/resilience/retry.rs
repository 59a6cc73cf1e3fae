//! Retry executor
//!
//! Runs one fallible async operation under a [`RetryPolicy`]. Failures are classified after
//! every attempt; only retryable ones are retried, and when attempts run out the error from
//! the *last* attempt is returned.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::backoff::RetryPolicy;
use super::clock::{Sleeper, TokioSleeper};
use crate::client::error_classification::{classify, Failure};
use crate::Result;

#[derive(Clone)]
pub struct RetryExecutor {
    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor").finish_non_exhaustive()
    }
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Execute `operation` until it succeeds, fails non-retryably, or exhausts the policy.
    ///
    /// `operation` is invoked once per attempt and must produce a fresh future each time.
    pub async fn execute<T, F, Fut>(&self, policy: &RetryPolicy, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, Failure>>,
    {
        // Number of retries completed so far (0 during the first attempt).
        let mut attempt: u32 = 0;

        loop {
            let failure = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let classification = classify(&failure);
            let attempts_made = attempt + 1;

            if !classification.retryable {
                warn!(
                    kind = %classification.kind,
                    attempts = attempts_made,
                    "non-retryable failure: {}",
                    classification.message
                );
                return Err(annotate(classification.into_error(), attempts_made));
            }

            if attempt >= policy.max_attempts {
                warn!(
                    kind = %classification.kind,
                    attempts = attempts_made,
                    "retries exhausted: {}",
                    classification.message
                );
                return Err(annotate(classification.into_error(), attempts_made));
            }

            let delay = policy.delay_for_attempt(attempt);
            debug!(
                kind = %classification.kind,
                attempt = attempts_made,
                delay_ms = delay.as_millis() as u64,
                "retry scheduled"
            );
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

fn annotate(err: crate::Error, attempts: u32) -> crate::Error {
    let context = err
        .context()
        .clone()
        .with_details(format!("attempts: {}", attempts));
    err.with_context(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::backoff::BackoffStrategy;
    use crate::ErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn executor() -> (RetryExecutor, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        (RetryExecutor::with_sleeper(sleeper.clone()), sleeper)
    }

    fn exponential(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            BackoffStrategy::ExponentialBackoff,
            max_attempts,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn returns_first_success_without_sleeping() {
        let (executor, sleeper) = executor();
        let value = executor
            .execute(&exponential(3), || async { Ok::<_, Failure>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_last_error() {
        let (executor, sleeper) = executor();
        let calls = AtomicU32::new(0);

        let err = executor
            .execute(&exponential(3), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err::<(), _>(Failure::http(503, format!("attempt {}", n))) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.message(), "attempt 4");
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test]
    async fn non_retryable_stops_after_one_attempt() {
        let (executor, sleeper) = executor();
        let calls = AtomicU32::new(0);

        let err = executor
            .execute(&exponential(10), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Failure::http(401, "invalid api key")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let (executor, sleeper) = executor();
        let calls = AtomicU32::new(0);

        let value = executor
            .execute(&exponential(5), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Failure::timeout("connect timed out"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_max_attempts_means_single_try() {
        let (executor, _) = executor();
        let calls = AtomicU32::new(0);

        let err = executor
            .execute(&RetryPolicy::no_retry(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Failure::http(500, "boom")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.context().details.as_deref(), Some("attempts: 1"));
    }

    #[tokio::test]
    async fn last_error_wins_even_when_kind_changes() {
        let (executor, _) = executor();
        let calls = AtomicU32::new(0);

        let err = executor
            .execute(&exponential(2), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => Err::<(), _>(Failure::timeout("first")),
                        1 => Err(Failure::http(429, "second")),
                        _ => Err(Failure::http(500, "third")),
                    }
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.message(), "third");
        assert_eq!(err.context().status_code, Some(500));
    }
}
