//! # Resilience Module
//!
//! The two control-flow primitives every provisioner is built on.
//!
//! ## Architecture
//!
//! - **Operation Poller** ([`PollPolicy`]): waits for an eventually consistent
//!   resource to settle, classifying each observed status as pending, ready
//!   or failed.
//! - **Conflict-Retry Policy** ([`RetryPolicy`]): optimistic read, mutate,
//!   write for shared documents, plus a plain bounded retry for flaky
//!   commands.
//! - **Backoff** ([`BackoffConfig`]): exponential delays with a ceiling and
//!   jitter, shared by both retry flavours.
//!
//! Neither primitive spawns tasks; both sleep on the caller's task.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cloud_deploy_core::constants::status_tables;
//! use cloud_deploy_core::resilience::PollPolicy;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = PollPolicy::new(Duration::from_secs(2));
//! let status = policy
//!     .await_ready(&status_tables::CLUSTER, "shop", || async {
//!         Ok::<_, std::io::Error>("RUNNING".to_string())
//!     })
//!     .await?;
//! assert_eq!(status, "RUNNING");
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod poller;
pub mod retry;

pub use backoff::BackoffConfig;
pub use poller::{PollError, PollPolicy};
pub use retry::{RetryError, RetryPolicy};
