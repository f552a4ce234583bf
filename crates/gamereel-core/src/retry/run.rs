//! Async retry loop.

use std::fmt;
use std::future::Future;

use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Errors that know whether they are worth retrying.
pub trait Retryable {
    fn retry_kind(&self) -> ErrorKind;
}

/// The operation kept failing: either a non-transient error or the attempt cap was hit.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Attempts made, including the one that produced `last`.
    pub attempts: u32,
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.last, self.attempts)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Exhausted<E> {}

/// Run `op` until it succeeds or the policy says stop, sleeping the backoff between tries.
/// `op` receives the 1-based attempt number. `what` labels the retry log line.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    E: Retryable + fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => match policy.decide(attempt, e.retry_kind()) {
                RetryDecision::NoRetry => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last: e,
                    })
                }
                RetryDecision::RetryAfter(d) => {
                    tracing::warn!(what, attempt, delay_ms = d.as_millis() as u64, "retrying: {}", e);
                    tokio::time::sleep(d).await;
                    attempt += 1;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Flaky(ErrorKind);

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky {:?}", self.0)
        }
    }

    impl Retryable for Flaky {
        fn retry_kind(&self) -> ErrorKind {
            self.0
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let r = run_with_retry(&fast(5), "chunk", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(Flaky(ErrorKind::Connection))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(r, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_attempt_cap() {
        let err = run_with_retry(&fast(4), "chunk", |_| async {
            Err::<(), _>(Flaky(ErrorKind::Timeout))
        })
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 4);
    }

    #[tokio::test]
    async fn permanent_error_fails_immediately() {
        let err = run_with_retry(&fast(10), "chunk", |_| async {
            Err::<(), _>(Flaky(ErrorKind::Other))
        })
        .await
        .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(err.to_string().contains("after 1 attempt"));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_follow_policy() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        };
        let start = tokio::time::Instant::now();
        let _ = run_with_retry(&policy, "chunk", |_| async {
            Err::<(), _>(Flaky(ErrorKind::Connection))
        })
        .await;
        // 2 + 4 + 8 seconds of virtual time.
        assert_eq!(start.elapsed(), Duration::from_secs(14));
    }
}
