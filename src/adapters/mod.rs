//! # Client Adapters
//!
//! Concrete implementations of the [`crate::clients`] interfaces.
//!
//! - [`memory`]: the in-memory control plane used by tests and dry runs.
//! - [`command`]: the image builder and managed-app deployer, which are
//!   command-line tools rather than APIs.

pub mod command;
pub mod memory;

pub use command::{DockerCli, GcloudAppDeployer};
pub use memory::{Call, CloudScript, InMemoryCloud};
