//! Bounded retry around any fallible remote call.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use recallbrief_shared::{RecallBriefError, Result};

/// How the pause between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same pause after every failed attempt.
    Constant,
    /// `attempt * base_delay`.
    Linear,
}

/// Retries transient failures up to `max_attempts`; anything else returns at once.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff,
        }
    }

    pub fn constant(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(max_attempts, base_delay, Backoff::Constant)
    }

    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(max_attempts, base_delay, Backoff::Linear)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Constant => self.base_delay,
            Backoff::Linear => self.base_delay * attempt,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(op).await.0
    }

    /// Like [`execute`](Self::execute), also returning how many attempts were made.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if !e.is_transient() => return (Err(e), attempt),
                Err(e) if attempt >= self.max_attempts => {
                    let exhausted = RecallBriefError::ExhaustedRetries {
                        attempts: attempt,
                        last: Box::new(e),
                    };
                    return (Err(exhausted), attempt);
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    debug!(attempt, error = %e, delay_ms = delay.as_millis(), "transient failure, retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_never_grow_exponentially() {
        let constant = RetryPolicy::constant(3, Duration::from_secs(2));
        assert_eq!(constant.delay_after(1), Duration::from_secs(2));
        assert_eq!(constant.delay_after(3), Duration::from_secs(2));

        let linear = RetryPolicy::linear(3, Duration::from_secs(2));
        assert_eq!(linear.delay_after(1), Duration::from_secs(2));
        assert_eq!(linear.delay_after(2), Duration::from_secs(4));
        assert_eq!(linear.delay_after(3), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn always_transient_is_attempted_max_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::constant(3, Duration::ZERO);

        let (result, attempts) = policy
            .run(|_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RecallBriefError::Transient("HTTP 503".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(attempts, 3);
        match result {
            Err(RecallBriefError::ExhaustedRetries { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.is_transient());
            }
            other => panic!("expected ExhaustedRetries, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::linear(5, Duration::ZERO);

        let result = policy
            .execute(|_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(RecallBriefError::Permanent("HTTP 404".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RecallBriefError::Permanent(_))));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::constant(3, Duration::ZERO);

        let (result, attempts) = policy
            .run(|attempt| async move {
                if attempt < 3 {
                    Err(RecallBriefError::Transient("timeout".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::constant(0, Duration::ZERO).max_attempts(), 1);
    }
}
