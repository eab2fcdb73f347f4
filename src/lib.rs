#![allow(clippy::doc_markdown)] // Allow technical terms like YAML, IAM in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Cloud Deploy Core
//!
//! Provisioning orchestrator that wires together the cloud resources a web
//! application needs (project, billing, database, service APIs, buckets,
//! service accounts, cluster or managed app) and deploys the application
//! onto them.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - [`resilience`]: the Operation Poller and the Conflict-Retry Policy.
//! - [`provisioners`]: one provisioner per resource kind, each safe to run
//!   again after a partial failure.
//! - [`deploy`]: cluster and managed-app deployment drivers.
//! - [`orchestration`]: the create and update pipelines and the deployment
//!   record that connects them.
//!
//! Everything remote goes through the small interfaces in [`clients`];
//! [`adapters`] holds the in-memory control plane and the command-line
//! adapters.
//!
//! ## Module Organization
//!
//! - [`config`] - Layered deployment configuration
//! - [`error`] - Client and provisioning errors with their categories
//! - [`constants`] - Resource kinds, status tables and fixed names
//! - [`naming`] - Deterministic resource names
//! - [`policy`] - IAM-style policy documents
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cloud_deploy_core::adapters::InMemoryCloud;
//! use cloud_deploy_core::clients::Superuser;
//! use cloud_deploy_core::config::DeployConfig;
//! use cloud_deploy_core::constants::{Backend, CreationMode};
//! use cloud_deploy_core::orchestration::{CreateRequest, WorkflowManager};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cloud = Arc::new(InMemoryCloud::new());
//! let manager = WorkflowManager::new(cloud.clients(), DeployConfig::default());
//!
//! let url = manager
//!     .create_and_deploy(CreateRequest {
//!         project_id: "demo-123456".into(),
//!         project_name: "Demo".into(),
//!         app_name: "shop".into(),
//!         project_dir: "/tmp/shop".into(),
//!         mode: CreationMode::Create,
//!         billing_account: "billingAccounts/000000-AAAAAA-000000".into(),
//!         backend: Backend::Cluster,
//!         database_password: "change-me".into(),
//!         superuser: Superuser {
//!             username: "admin".into(),
//!             email: "admin@example.com".into(),
//!             password: "change-me".into(),
//!         },
//!         bucket_name: None,
//!     })
//!     .await?;
//! println!("live at {url}");
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod clients;
pub mod config;
pub mod constants;
pub mod deploy;
pub mod error;
pub mod logging;
pub mod naming;
pub mod orchestration;
pub mod policy;
pub mod provisioners;
pub mod resilience;

pub use config::{ConfigManager, DeployConfig};
pub use constants::{Backend, CreationMode, Lifecycle, ResourceKind};
pub use error::{ApiError, ApiErrorKind, ErrorCategory, ProvisionError, ProvisionResult};
pub use orchestration::{CreateRequest, UpdateRequest, WorkflowManager};
