//! Bounded retry for the account side of a membership write

use crate::store::{within, StoreError};
use crate::telemetry;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// How long and how often the account-side write is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaPolicy {
    /// Total budget for the account-side write, retries included
    pub deadline: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SagaPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(3),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Run an idempotent write until it succeeds, fails permanently, or the
/// policy deadline runs out. Returns the last error in the latter cases.
pub(crate) async fn retry_idempotent<T, F, Fut>(
    policy: &SagaPolicy,
    op: &'static str,
    mut attempt: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let started = Instant::now();
    let mut backoff = policy.initial_backoff;
    let mut tries = 0u32;

    loop {
        tries += 1;
        let remaining = policy.deadline.saturating_sub(started.elapsed());
        let err = match within(remaining, op, attempt()).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        if started.elapsed() + backoff >= policy.deadline {
            warn!(op, tries, error = %err, "Giving up on account-side write");
            return Err(err);
        }
        warn!(op, tries, backoff_ms = backoff.as_millis() as u64, error = %err, "Retrying account-side write");
        metrics::counter!(telemetry::SAGA_RETRIES, "op" => op).increment(1);
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = retry_idempotent(&SagaPolicy::default(), "put_membership", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(StoreError::Unavailable("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_idempotent(&SagaPolicy::default(), "put_membership", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::NotFound { entity: "account" }) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_retries() {
        let policy = SagaPolicy::default();
        let started = Instant::now();
        let result: Result<(), _> = retry_idempotent(&policy, "drop_membership", || async {
            Err(StoreError::Unavailable("down".into()))
        })
        .await;
        assert!(result.is_err());
        assert!(started.elapsed() <= policy.deadline);
    }
}
