//! # Pipeline Orchestrator
//!
//! Sequences the provisioners and the deployment driver into the two
//! lifecycles.
//!
//! ## Architecture
//!
//! ```text
//! CREATE: project -> billing -> source_generation -> database -> enable_services
//!         -> static_content -> service_accounts -> deploy
//! UPDATE: database_migrate -> static_content_update -> deploy_update
//! ```
//!
//! - [`PipelineRun`] executes its steps strictly in order on the caller's
//!   task. The first error stops the run and is returned unchanged; nothing
//!   is rolled back, so the whole pipeline can simply be run again.
//! - [`PipelineContext`] carries identifiers from earlier steps to later
//!   ones.
//! - [`WorkflowManager`] builds the pipelines and reads or writes the
//!   [`DeploymentRecord`] that lets an update run skip the create inputs.

pub mod context;
pub mod pipeline;
pub mod record;
pub mod steps;
pub mod workflow_manager;

pub use context::PipelineContext;
pub use pipeline::{PipelineRun, PipelineStep, StepRecord, StepState};
pub use record::{DeploymentRecord, FileRecordStore, RecordStore};
pub use workflow_manager::{CreateRequest, UpdateRequest, WorkflowManager};
