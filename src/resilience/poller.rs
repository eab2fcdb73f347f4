//! # Operation Poller
//!
//! One waiting primitive for every eventually consistent resource. A
//! [`PollPolicy`] repeatedly calls a status check and sleeps between calls;
//! the status is classified through a [`StatusTable`] so callers never write
//! their own sleep loops.
//!
//! Two shapes are offered:
//!
//! - [`PollPolicy::await_ready`] for resources with a status enumeration.
//!   Unknown statuses fail immediately with [`PollError::UnexpectedStatus`].
//! - [`PollPolicy::poll_until`] for "wait until a value shows up" checks such
//!   as ready replicas or an ingress address. Exhausting the budget yields
//!   `Ok(None)` rather than an error, so the caller reports "not ready".

use crate::constants::{StatusClass, StatusTable};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Errors from [`PollPolicy::await_ready`], generic over the check's error.
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    /// The status check itself failed
    #[error("status check failed: {0}")]
    Check(E),

    /// The resource settled in a status that is neither pending nor ready
    #[error("unexpected status {status}")]
    UnexpectedStatus { status: String },

    /// A bounded poll ran out of attempts while still pending
    #[error("still pending after {polls} polls")]
    Exhausted { polls: u32 },
}

/// Interval and optional attempt budget for a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits for as long as the resource stays pending.
    pub max_polls: Option<u32>,
}

impl PollPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_polls: None,
        }
    }

    pub fn bounded(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls: Some(max_polls),
        }
    }

    fn budget_spent(&self, polls: u32) -> bool {
        self.max_polls.is_some_and(|max| polls >= max)
    }

    /// Call `check` until it reports a ready status. Returns that status.
    pub async fn await_ready<F, Fut, E>(
        &self,
        table: &StatusTable,
        name: &str,
        mut check: F,
    ) -> Result<String, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let mut polls = 0u32;
        loop {
            polls += 1;
            let status = check().await.map_err(PollError::Check)?;
            match table.classify(&status) {
                StatusClass::Ready => {
                    debug!(
                        resource = %table.resource,
                        name = %name,
                        status = %status,
                        polls = polls,
                        "✅ Resource ready"
                    );
                    return Ok(status);
                }
                StatusClass::Failed => return Err(PollError::UnexpectedStatus { status }),
                StatusClass::Pending => {
                    if self.budget_spent(polls) {
                        return Err(PollError::Exhausted { polls });
                    }
                    debug!(
                        resource = %table.resource,
                        name = %name,
                        status = %status,
                        poll = polls,
                        "⏳ Waiting for resource"
                    );
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }

    /// Call `check` until it yields a value. `Ok(None)` means the budget ran
    /// out first.
    pub async fn poll_until<F, Fut, T, E>(&self, mut check: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let mut polls = 0u32;
        loop {
            polls += 1;
            if let Some(value) = check().await? {
                return Ok(Some(value));
            }
            if self.budget_spent(polls) {
                return Ok(None);
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
