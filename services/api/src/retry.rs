//! services/api/src/retry.rs
//!
//! Bounded retry with jittered backoff for transient store failures. Only
//! `Unavailable` errors are retried; validation and not-found outcomes are
//! final on the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use studydesk_core::error::{DataError, DataResult};
use studydesk_core::ports::{StoreError, StoreResult};

pub const RETRY_ATTEMPTS: u32 = 3;

/// Runs `call` until it succeeds, fails with a non-transient error, or the
/// attempt budget runs out. The final transient failure is surfaced as
/// `RetryExhausted` so callers can tell a flaky store from a clean failure.
pub async fn with_retry<T, F, Fut>(op: &str, mut call: F) -> DataResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt < RETRY_ATTEMPTS => {
                let delay = backoff(attempt);
                warn!(
                    "{op} failed on attempt {attempt}/{RETRY_ATTEMPTS}, retrying in {delay:?}: {err}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) if is_transient(&err) => {
                return Err(DataError::RetryExhausted {
                    attempts: RETRY_ATTEMPTS,
                    source: Box::new(err.into()),
                })
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn is_transient(err: &StoreError) -> bool {
    matches!(err, StoreError::Unavailable(_))
}

fn backoff(attempt: u32) -> Duration {
    let base = 50u64 * 2u64.pow(attempt - 1);
    let jitter = rand::thread_rng().gen_range(0..=base);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::Unavailable("flaky".into()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn not_found_is_never_retried() {
        let calls = AtomicU32::new(0);
        let result: DataResult<u32> = with_retry("test op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::NotFound("gone".into())) }
        })
        .await;
        assert!(matches!(result, Err(DataError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_failure_surfaces_retry_exhausted() {
        let result: DataResult<u32> = with_retry("test op", || async {
            Err(StoreError::Unavailable("down".into()))
        })
        .await;
        assert!(matches!(
            result,
            Err(DataError::RetryExhausted { attempts: RETRY_ATTEMPTS, .. })
        ));
    }
}
