//! Project provisioning with create / create-if-needed / must-exist modes.

use crate::clients::ProjectApi;
use crate::constants::{CreationMode, ResourceKind};
use crate::error::{ApiErrorKind, ErrorCategory, ProvisionError, ProvisionResult};
use crate::logging::log_resource_operation;
use crate::naming::validate_project_id;
use crate::resilience::PollPolicy;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSpec {
    pub project_id: String,
    pub name: String,
    pub mode: CreationMode,
}

#[derive(Clone)]
pub struct ProjectProvisioner {
    api: Arc<dyn ProjectApi>,
    confirm: PollPolicy,
}

impl ProjectProvisioner {
    pub fn new(api: Arc<dyn ProjectApi>, confirm: PollPolicy) -> Self {
        Self { api, confirm }
    }

    /// A project we cannot see (absent or forbidden) counts as absent.
    pub async fn exists(&self, project_id: &str) -> ProvisionResult<bool> {
        match self.api.get_project(project_id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() || e.is_permission_denied() => Ok(false),
            Err(source) => Err(ProvisionError::Api {
                resource: ResourceKind::Project,
                source,
            }),
        }
    }

    pub async fn ensure(&self, spec: &ProjectSpec) -> ProvisionResult<String> {
        let project_id = spec.project_id.as_str();
        validate_project_id(project_id)?;

        let exists = self.exists(project_id).await?;
        match (spec.mode, exists) {
            (CreationMode::MustExist, false) => Err(ProvisionError::DoesNotExist {
                resource: ResourceKind::Project,
                name: project_id.to_string(),
            }),
            (CreationMode::Create, true) => Err(ProvisionError::AlreadyExists {
                resource: ResourceKind::Project,
                name: project_id.to_string(),
            }),
            (CreationMode::MustExist | CreationMode::CreateIfNeeded, true) => {
                info!(
                    project_id = %project_id,
                    mode = %spec.mode,
                    category = %ErrorCategory::ReusableConflict,
                    "📁 Using existing project"
                );
                Ok(project_id.to_string())
            }
            (CreationMode::Create | CreationMode::CreateIfNeeded, false) => {
                self.create(project_id, &spec.name).await?;
                Ok(project_id.to_string())
            }
        }
    }

    async fn create(&self, project_id: &str, name: &str) -> ProvisionResult<()> {
        match self.api.create_project(project_id, name).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                return Err(ProvisionError::AlreadyExists {
                    resource: ResourceKind::Project,
                    name: project_id.to_string(),
                })
            }
            Err(e) if e.kind == ApiErrorKind::InvalidArgument => {
                return Err(ProvisionError::InvalidName {
                    resource: ResourceKind::Project,
                    name: project_id.to_string(),
                    message: e.message,
                })
            }
            Err(source) => {
                return Err(ProvisionError::from_api(
                    ResourceKind::Project,
                    project_id,
                    source,
                ))
            }
        }
        info!(project_id = %project_id, "📁 Project created, waiting for it to become visible");

        // Creation is eventually consistent; reads can miss a fresh project.
        let visible = self
            .confirm
            .poll_until(move || async move {
                Ok::<_, ProvisionError>(self.exists(project_id).await?.then_some(()))
            })
            .await?;

        match visible {
            Some(()) => {
                log_resource_operation("create", "project", project_id, Some(project_id), "visible");
                Ok(())
            }
            None => Err(ProvisionError::unexpected_response(
                ResourceKind::Project,
                format!("project {project_id} was created but never became visible"),
            )),
        }
    }
}
