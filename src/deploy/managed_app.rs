//! Managed-app-backed deployment.

use super::manifest::{managed_app_service, managed_app_url};
use super::{DeployContext, DeploymentDriver};
use crate::clients::AppDeployer;
use crate::constants::{Backend, ResourceKind};
use crate::error::{ProvisionError, ProvisionResult};
use crate::provisioners::{ManagedAppProvisioner, StorageProvisioner};
use crate::resilience::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct ManagedAppDriver {
    managed_app: ManagedAppProvisioner,
    storage: StorageProvisioner,
    deployer: Arc<dyn AppDeployer>,
    retry: RetryPolicy,
}

impl ManagedAppDriver {
    pub fn new(
        managed_app: ManagedAppProvisioner,
        storage: StorageProvisioner,
        deployer: Arc<dyn AppDeployer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            managed_app,
            storage,
            deployer,
            retry,
        }
    }

    /// The platform has no secret store, so database credentials go to a
    /// private bucket the application reads at startup.
    async fn upload_secrets(&self, ctx: &DeployContext) -> ProvisionResult<()> {
        let staging = tempfile::tempdir().map_err(|e| ProvisionError::io("<tempdir>", e))?;
        ctx.secrets.write_database_file(staging.path()).await?;
        self.storage
            .serve_secrets(&ctx.project_id, &ctx.names.secrets_bucket, staging.path())
            .await?;
        Ok(())
    }

    /// Run the deploy command, retrying every failure with backoff.
    async fn ship(&self, ctx: &DeployContext) -> ProvisionResult<String> {
        let app_yaml = ctx.app_dir.join("app.yaml");
        let deployer = self.deployer.as_ref();
        let project_id = ctx.project_id.as_str();
        let descriptor = app_yaml.as_path();

        self.retry
            .retry(
                "managed_app_deploy",
                move || deployer.deploy(project_id, descriptor),
                |_| true,
            )
            .await
            .map_err(|e| ProvisionError::RetriesExhausted {
                resource: ResourceKind::Deployment,
                attempts: e.attempts,
                source: e.last_error,
            })?;

        let service = managed_app_service(&ctx.app_dir).await?;
        let url = managed_app_url(&ctx.project_id, &service);
        info!(project_id = %ctx.project_id, service = %service, url = %url, "🚀 Managed app deployed");
        Ok(url)
    }
}

#[async_trait]
impl DeploymentDriver for ManagedAppDriver {
    fn backend(&self) -> Backend {
        Backend::ManagedApp
    }

    async fn deploy(&self, ctx: &DeployContext) -> ProvisionResult<String> {
        self.upload_secrets(ctx).await?;
        self.managed_app
            .ensure(&ctx.project_id, &ctx.app_region)
            .await?;
        self.ship(ctx).await
    }

    async fn update(&self, ctx: &DeployContext) -> ProvisionResult<String> {
        self.ship(ctx).await
    }
}
