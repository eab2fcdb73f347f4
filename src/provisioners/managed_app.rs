//! Managed application creation.

use super::poll_failure;
use crate::clients::AppEngineApi;
use crate::constants::{status_tables, ResourceKind};
use crate::error::{ErrorCategory, ProvisionError, ProvisionResult};
use crate::resilience::PollPolicy;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ManagedAppProvisioner {
    api: Arc<dyn AppEngineApi>,
    poll: PollPolicy,
}

impl ManagedAppProvisioner {
    pub fn new(api: Arc<dyn AppEngineApi>, poll: PollPolicy) -> Self {
        Self { api, poll }
    }

    /// Create the project's application in `region` unless one exists.
    /// Returns whether it was created by this call.
    pub async fn ensure(&self, project_id: &str, region: &str) -> ProvisionResult<bool> {
        match self.api.get_app(project_id).await {
            Ok(app) => {
                info!(project_id = %project_id, location = %app.location, "🚀 Managed app exists");
                return Ok(false);
            }
            Err(e) if e.is_not_found() => {}
            Err(source) => {
                return Err(ProvisionError::from_api(
                    ResourceKind::ManagedApp,
                    project_id,
                    source,
                ))
            }
        }

        let operation = match self.api.create_app(project_id, region).await {
            Ok(operation) => operation,
            Err(e) if e.is_conflict() => {
                info!(
                    project_id = %project_id,
                    category = %ErrorCategory::ReusableConflict,
                    "🚀 Managed app created concurrently"
                );
                return Ok(false);
            }
            Err(source) => {
                return Err(ProvisionError::from_api(
                    ResourceKind::ManagedApp,
                    project_id,
                    source,
                ))
            }
        };

        let operation_id = operation.operation_id();
        let api = self.api.as_ref();
        self.poll
            .await_ready(
                &status_tables::MANAGED_APP_OPERATION,
                project_id,
                move || async move {
                    api.get_operation(project_id, operation_id)
                        .await
                        .map(|op| op.status())
                },
            )
            .await
            .map_err(|e| poll_failure(ResourceKind::ManagedApp, project_id, e))?;

        info!(project_id = %project_id, region = %region, "🚀 Managed app created");
        Ok(true)
    }
}
