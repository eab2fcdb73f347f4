//! Cloud API enablement.

use super::poll_failure;
use crate::clients::ServiceUsageApi;
use crate::config::ServiceSpec;
use crate::constants::{status_tables, ResourceKind};
use crate::error::{ProvisionError, ProvisionResult};
use crate::resilience::PollPolicy;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ServiceEnabler {
    api: Arc<dyn ServiceUsageApi>,
    poll: PollPolicy,
}

impl ServiceEnabler {
    pub fn new(api: Arc<dyn ServiceUsageApi>, poll: PollPolicy) -> Self {
        Self { api, poll }
    }

    /// Enable one API and wait until it reports enabled. Enabling an API that
    /// is already on is a no-op upstream.
    pub async fn ensure(&self, project_id: &str, service: &str) -> ProvisionResult<()> {
        let response = self
            .api
            .enable_service(project_id, service)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::ApiService, service, e))?;

        if response.name.is_empty() {
            return Err(ProvisionError::unexpected_response(
                ResourceKind::ApiService,
                format!("enabling {service} returned no operation"),
            ));
        }

        let api = self.api.as_ref();
        self.poll
            .await_ready(&status_tables::API_SERVICE, service, move || async move {
                api.get_service(project_id, service).await.map(|s| s.state)
            })
            .await
            .map_err(|e| poll_failure(ResourceKind::ApiService, service, e))?;
        Ok(())
    }

    pub async fn ensure_all(
        &self,
        project_id: &str,
        services: &[ServiceSpec],
    ) -> ProvisionResult<()> {
        for service in services {
            self.ensure(project_id, &service.name).await?;
            info!(
                project_id = %project_id,
                service = %service.name,
                title = %service.title,
                "🔌 API enabled"
            );
        }
        Ok(())
    }
}
