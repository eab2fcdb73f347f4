//! The concrete steps of the create and update pipelines.
//!
//! Each step reads what earlier steps left in the [`PipelineContext`], calls
//! one provisioner or driver, and records its own outputs.

use super::context::PipelineContext;
use super::pipeline::PipelineStep;
use crate::clients::{DatabaseTarget, SourceGenerator, SourceSpec, Superuser};
use crate::config::{DefaultsConfig, ServiceAccountSpec, ServiceSpec};
use crate::constants::{context_keys, CreationMode, ResourceKind, DATABASE_SECRET_GROUP};
use crate::deploy::{DeployContext, DeploymentDriver, SecretsPayload};
use crate::error::{ProvisionError, ProvisionResult};
use crate::naming::ResourceNames;
use crate::provisioners::{
    BillingProvisioner, DatabaseProvisioner, InstanceSpec, ProjectProvisioner, ProjectSpec,
    ServiceAccountProvisioner, ServiceEnabler, StorageProvisioner,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const STATIC_DIR: &str = "static";

fn database_target(
    app_dir: &Path,
    names: &ResourceNames,
    defaults: &DefaultsConfig,
    password: &str,
) -> DatabaseTarget {
    DatabaseTarget {
        app_dir: app_dir.to_path_buf(),
        project_id: names.project_id.clone(),
        instance: names.database_instance.clone(),
        region: defaults.region.clone(),
        user: defaults.database_user.clone(),
        password: password.to_string(),
    }
}

fn deploy_context(
    context: &PipelineContext,
    step: &str,
    defaults: &DefaultsConfig,
    secrets: SecretsPayload,
) -> ProvisionResult<DeployContext> {
    Ok(DeployContext {
        project_id: context.project_id(step)?.to_string(),
        app_name: context.require_str(step, context_keys::APP_NAME)?.to_string(),
        app_dir: context.app_dir(step)?,
        names: context.resource_names(step)?,
        secrets,
        region: defaults.region.clone(),
        zone: defaults.zone.clone(),
        app_region: defaults.app_region.clone(),
    })
}

pub struct ProjectStep {
    pub provisioner: ProjectProvisioner,
    pub mode: CreationMode,
}

#[async_trait]
impl PipelineStep for ProjectStep {
    fn name(&self) -> &'static str {
        "project"
    }

    fn title(&self) -> &'static str {
        "Creating or reusing the project"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let spec = ProjectSpec {
            project_id: context.project_id(self.name())?.to_string(),
            name: context
                .require_str(self.name(), context_keys::PROJECT_NAME)?
                .to_string(),
            mode: self.mode,
        };
        let project_id = self.provisioner.ensure(&spec).await?;
        context.set(context_keys::PROJECT_ID, project_id);
        Ok(())
    }
}

pub struct BillingStep {
    pub provisioner: BillingProvisioner,
}

#[async_trait]
impl PipelineStep for BillingStep {
    fn name(&self) -> &'static str {
        "billing"
    }

    fn title(&self) -> &'static str {
        "Enabling billing"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let project_id = context.project_id(self.name())?;
        let account = context.require_str(self.name(), context_keys::BILLING_ACCOUNT)?;
        self.provisioner.ensure(project_id, account).await
    }
}

pub struct SourceGenerationStep {
    pub generator: Arc<dyn SourceGenerator>,
    pub defaults: DefaultsConfig,
    pub database_password: String,
    /// Key secrets mounted by the database proxy
    pub proxy_secrets: Vec<String>,
    /// Key secrets mounted by the application, after the database group
    pub app_secrets: Vec<String>,
}

#[async_trait]
impl PipelineStep for SourceGenerationStep {
    fn name(&self) -> &'static str {
        "source_generation"
    }

    fn title(&self) -> &'static str {
        "Generating the application source"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let names = context.resource_names(self.name())?;
        let spec = SourceSpec {
            project_id: context.project_id(self.name())?.to_string(),
            app_name: context
                .require_str(self.name(), context_keys::APP_NAME)?
                .to_string(),
            project_dir: context.app_dir(self.name())?,
            database_user: self.defaults.database_user.clone(),
            database_password: self.database_password.clone(),
            database_instance: names.database_instance.clone(),
            database_name: names.database.clone(),
            region: self.defaults.region.clone(),
            static_bucket: names.static_bucket.clone(),
            image_tag: names.image_tag.clone(),
            cloudsql_secrets: self.proxy_secrets.clone(),
            app_secrets: std::iter::once(DATABASE_SECRET_GROUP.to_string())
                .chain(self.app_secrets.iter().cloned())
                .collect(),
        };

        let app_dir = self.generator.generate(&spec).await.map_err(|e| {
            ProvisionError::from_api(
                ResourceKind::SourceTree,
                spec.project_dir.display().to_string(),
                e,
            )
        })?;
        info!(app_dir = %app_dir.display(), "🧱 Source tree generated");
        context.set(context_keys::APP_DIR, app_dir.display().to_string());
        Ok(())
    }
}

pub struct DatabaseStep {
    pub provisioner: DatabaseProvisioner,
    pub defaults: DefaultsConfig,
    pub password: String,
    pub superuser: Superuser,
}

#[async_trait]
impl PipelineStep for DatabaseStep {
    fn name(&self) -> &'static str {
        "database"
    }

    fn title(&self) -> &'static str {
        "Creating the database"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let names = context.resource_names(self.name())?;
        let app_dir = context.app_dir(self.name())?;
        let project_id = names.project_id.as_str();

        let instance = InstanceSpec {
            name: names.database_instance.clone(),
            region: self.defaults.region.clone(),
            database_version: self.defaults.database_version.clone(),
            cpus: self.defaults.database_cpus,
            memory_mb: self.defaults.database_memory_mb,
        };
        self.provisioner
            .ensure_instance(project_id, &instance)
            .await?;
        self.provisioner
            .ensure_database(project_id, &names.database_instance, &names.database)
            .await?;
        self.provisioner
            .set_password(
                project_id,
                &names.database_instance,
                &self.defaults.database_user,
                &self.password,
            )
            .await?;

        let target = database_target(&app_dir, &names, &self.defaults, &self.password);
        self.provisioner.migrate(&target).await?;
        self.provisioner
            .ensure_superuser(&target, &self.superuser)
            .await?;

        context.set_secrets(SecretsPayload::with_database_credentials(
            &self.defaults.database_user,
            &self.password,
        ));
        Ok(())
    }
}

pub struct EnableServicesStep {
    pub enabler: ServiceEnabler,
    pub services: Vec<ServiceSpec>,
}

#[async_trait]
impl PipelineStep for EnableServicesStep {
    fn name(&self) -> &'static str {
        "enable_services"
    }

    fn title(&self) -> &'static str {
        "Enabling cloud APIs"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let project_id = context.project_id(self.name())?;
        self.enabler.ensure_all(project_id, &self.services).await
    }
}

pub struct StaticContentStep {
    pub storage: StorageProvisioner,
}

#[async_trait]
impl PipelineStep for StaticContentStep {
    fn name(&self) -> &'static str {
        "static_content"
    }

    fn title(&self) -> &'static str {
        "Serving static content"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let names = context.resource_names(self.name())?;
        let app_dir = context.app_dir(self.name())?;
        self.storage
            .serve_static(
                &names.project_id,
                &names.static_bucket,
                &app_dir,
                &app_dir.join(STATIC_DIR),
            )
            .await?;
        Ok(())
    }
}

pub struct ServiceAccountsStep {
    pub provisioner: ServiceAccountProvisioner,
    /// Accounts grouped by the container that mounts their keys
    pub accounts: BTreeMap<String, Vec<ServiceAccountSpec>>,
}

#[async_trait]
impl PipelineStep for ServiceAccountsStep {
    fn name(&self) -> &'static str {
        "service_accounts"
    }

    fn title(&self) -> &'static str {
        "Creating service accounts and secrets"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let project_id = context.project_id(self.name())?.to_string();
        context.require_secrets(self.name())?;

        for account in self.accounts.values().flatten() {
            self.provisioner.ensure(&project_id, account).await?;
            let key = self.provisioner.create_key(&project_id, &account.id).await?;
            context
                .secrets_mut(self.name())?
                .insert(&account.id, &account.file_name, &key);
        }
        Ok(())
    }
}

pub struct DeployStep {
    pub driver: Arc<dyn DeploymentDriver>,
    pub defaults: DefaultsConfig,
}

#[async_trait]
impl PipelineStep for DeployStep {
    fn name(&self) -> &'static str {
        "deploy"
    }

    fn title(&self) -> &'static str {
        "Deploying the application"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let secrets = context.require_secrets(self.name())?.clone();
        let ctx = deploy_context(context, self.name(), &self.defaults, secrets)?;
        info!(project_id = %ctx.project_id, backend = %self.driver.backend(), "🚢 Deploying");
        let url = self.driver.deploy(&ctx).await?;
        context.set(context_keys::APP_URL, url);
        Ok(())
    }
}

pub struct DatabaseMigrateStep {
    pub provisioner: DatabaseProvisioner,
    pub defaults: DefaultsConfig,
    pub password: String,
}

#[async_trait]
impl PipelineStep for DatabaseMigrateStep {
    fn name(&self) -> &'static str {
        "database_migrate"
    }

    fn title(&self) -> &'static str {
        "Migrating the database"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let names = context.resource_names(self.name())?;
        let app_dir = context.app_dir(self.name())?;
        let target = database_target(&app_dir, &names, &self.defaults, &self.password);
        self.provisioner.migrate(&target).await
    }
}

pub struct StaticContentUpdateStep {
    pub storage: StorageProvisioner,
}

#[async_trait]
impl PipelineStep for StaticContentUpdateStep {
    fn name(&self) -> &'static str {
        "static_content_update"
    }

    fn title(&self) -> &'static str {
        "Updating static content"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let names = context.resource_names(self.name())?;
        let app_dir = context.app_dir(self.name())?;
        self.storage
            .update_static(&names.static_bucket, &app_dir, &app_dir.join(STATIC_DIR))
            .await?;
        Ok(())
    }
}

pub struct DeployUpdateStep {
    pub driver: Arc<dyn DeploymentDriver>,
    pub defaults: DefaultsConfig,
}

#[async_trait]
impl PipelineStep for DeployUpdateStep {
    fn name(&self) -> &'static str {
        "deploy_update"
    }

    fn title(&self) -> &'static str {
        "Deploying the new version"
    }

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
        let ctx = deploy_context(
            context,
            self.name(),
            &self.defaults,
            SecretsPayload::default(),
        )?;
        info!(project_id = %ctx.project_id, backend = %self.driver.backend(), "🚢 Redeploying");
        let url = self.driver.update(&ctx).await?;
        context.set(context_keys::APP_URL, url);
        Ok(())
    }
}
