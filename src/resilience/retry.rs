//! # Conflict-Retry Policy
//!
//! Bounded retries with exponential backoff. [`RetryPolicy::read_modify_write`]
//! implements optimistic concurrency for documents other actors may change
//! between our read and our write: a conflicting write restarts the whole
//! read, mutate, write cycle. Any other error returns immediately.
//!
//! [`RetryPolicy::retry`] is the looser variant for commands whose failures
//! are usually transient; the caller decides which errors are worth another
//! attempt.

use super::backoff::BackoffConfig;
use crate::error::ConflictAware;
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

/// The last error of a retry loop, with the number of attempts made.
#[derive(Debug, thiserror::Error)]
#[error("gave up after {attempts} attempts: {last_error}")]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last_error: E,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_tries: u32,
    pub backoff: BackoffConfig,
}

impl RetryPolicy {
    pub fn new(max_tries: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_tries: max_tries.max(1),
            backoff,
        }
    }

    /// Run `operation` until it succeeds, `should_retry` rejects its error,
    /// or `max_tries` attempts have been made.
    pub async fn retry<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut operation: F,
        should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = %label, attempts = attempt, "🔁 Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if attempt < self.max_tries && should_retry(&error) => {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    warn!(
                        operation = %label,
                        attempt = attempt,
                        max_tries = self.max_tries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔁 Attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(last_error) => {
                    return Err(RetryError {
                        attempts: attempt,
                        last_error,
                    })
                }
            }
        }
    }

    /// Read a document, apply `mutate`, write it back. A conflicting write
    /// restarts from the read. After `max_tries` conflicts the last conflict
    /// error is returned.
    ///
    /// `mutate` may run once per attempt, so it must be idempotent.
    pub async fn read_modify_write<D, T, E, R, RFut, M, W, WFut>(
        &self,
        label: &str,
        mut read: R,
        mut mutate: M,
        mut write: W,
    ) -> Result<T, E>
    where
        R: FnMut() -> RFut,
        RFut: Future<Output = Result<D, E>>,
        M: FnMut(D) -> D,
        W: FnMut(D) -> WFut,
        WFut: Future<Output = Result<T, E>>,
        E: ConflictAware + Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let document = read().await?;
            let document = mutate(document);
            match write(document).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_conflict() && attempt < self.max_tries => {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    warn!(
                        operation = %label,
                        attempt = attempt,
                        max_tries = self.max_tries,
                        delay_ms = delay.as_millis() as u64,
                        "🔁 Concurrent modification, re-reading"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, BackoffConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_conflict_is_retried_max_tries_then_returned() {
        let reads = AtomicU32::new(0);
        let writes = AtomicU32::new(0);

        let err = policy()
            .read_modify_write(
                "policy",
                || {
                    reads.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<Vec<String>, ApiError>(Vec::new()) }
                },
                |mut doc: Vec<String>| {
                    doc.push("member".to_string());
                    doc
                },
                |_doc| {
                    writes.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(ApiError::conflict("etag mismatch")) }
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(writes.load(Ordering::SeqCst), 5);
        assert_eq!(reads.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_third_attempt() {
        let writes = AtomicU32::new(0);

        let result = policy()
            .read_modify_write(
                "policy",
                || async { Ok::<u32, ApiError>(0) },
                |doc: u32| doc + 1,
                |doc| {
                    let n = writes.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(ApiError::conflict("busy"))
                        } else {
                            Ok(doc)
                        }
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(result, 1);
        assert_eq!(writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_conflict_errors_fail_fast() {
        let writes = AtomicU32::new(0);

        let err = policy()
            .read_modify_write(
                "policy",
                || async { Ok::<u32, ApiError>(0) },
                |doc| doc,
                |_| {
                    writes.fetch_add(1, Ordering::SeqCst);
                    async { Err::<u32, _>(ApiError::permission_denied("nope")) }
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_permission_denied());
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_are_not_retried() {
        let reads = AtomicU32::new(0);
        let err = policy()
            .read_modify_write(
                "policy",
                || {
                    reads.fetch_add(1, Ordering::SeqCst);
                    async { Err::<u32, _>(ApiError::conflict("odd")) }
                },
                |doc| doc,
                |doc| async move { Ok::<u32, ApiError>(doc) },
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_counts_attempts_for_any_error() {
        let calls = AtomicU32::new(0);
        let err = policy()
            .retry(
                "deploy",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(ApiError::unknown("flaky")) }
                },
                |_| true,
            )
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_when_predicate_refuses() {
        let calls = AtomicU32::new(0);
        let err = policy()
            .retry(
                "deploy",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(ApiError::invalid_argument("bad yaml")) }
                },
                |e: &ApiError| e.is_conflict(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
