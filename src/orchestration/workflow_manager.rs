//! Entry points for the create and update lifecycles.

use super::context::PipelineContext;
use super::pipeline::{PipelineRun, PipelineStep};
use super::record::{DeploymentRecord, FileRecordStore, RecordStore};
use super::steps::{
    BillingStep, DatabaseMigrateStep, DatabaseStep, DeployStep, DeployUpdateStep,
    EnableServicesStep, ProjectStep, ServiceAccountsStep, SourceGenerationStep,
    StaticContentStep, StaticContentUpdateStep,
};
use crate::clients::{CloudClients, Superuser};
use crate::config::DeployConfig;
use crate::constants::{
    context_keys, Backend, CreationMode, Lifecycle, APP_ACCOUNT_GROUP, PROXY_ACCOUNT_GROUP,
};
use crate::deploy::{driver_for, DeploymentDriver};
use crate::error::ProvisionResult;
use crate::naming::ResourceNames;
use crate::provisioners::Provisioners;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Inputs of a first-time deployment.
#[derive(Clone)]
pub struct CreateRequest {
    pub project_id: String,
    /// Display name of the project
    pub project_name: String,
    pub app_name: String,
    /// Directory the source tree is generated into
    pub project_dir: PathBuf,
    pub mode: CreationMode,
    pub billing_account: String,
    pub backend: Backend,
    pub database_password: String,
    pub superuser: Superuser,
    /// Static content bucket, when not named after the project
    pub bucket_name: Option<String>,
}

impl fmt::Debug for CreateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateRequest")
            .field("project_id", &self.project_id)
            .field("project_name", &self.project_name)
            .field("app_name", &self.app_name)
            .field("project_dir", &self.project_dir)
            .field("mode", &self.mode)
            .field("billing_account", &self.billing_account)
            .field("backend", &self.backend)
            .field("database_password", &"<redacted>")
            .field("superuser", &self.superuser)
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

/// Inputs of a redeployment.
#[derive(Clone)]
pub struct UpdateRequest {
    /// Directory holding the generated source and its deployment record
    pub app_dir: PathBuf,
    pub database_password: String,
}

impl fmt::Debug for UpdateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateRequest")
            .field("app_dir", &self.app_dir)
            .field("database_password", &"<redacted>")
            .finish()
    }
}

pub struct WorkflowManager {
    clients: CloudClients,
    config: DeployConfig,
    provisioners: Provisioners,
    records: Arc<dyn RecordStore>,
}

impl WorkflowManager {
    pub fn new(clients: CloudClients, config: DeployConfig) -> Self {
        Self::with_record_store(clients, config, Arc::new(FileRecordStore))
    }

    pub fn with_record_store(
        clients: CloudClients,
        config: DeployConfig,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let provisioners = Provisioners::new(&clients, &config);
        Self {
            clients,
            config,
            provisioners,
            records,
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    fn driver(&self, backend: Backend) -> Arc<dyn DeploymentDriver> {
        driver_for(backend, &self.clients, &self.provisioners, &self.config)
    }

    /// The create pipeline for `request`, ready to run.
    pub fn create_pipeline(&self, request: &CreateRequest) -> PipelineRun {
        let names = ResourceNames::derive(
            &request.project_id,
            &request.app_name,
            request.bucket_name.as_deref(),
        );
        let mut context = PipelineContext::new();
        context.set(context_keys::PROJECT_ID, request.project_id.as_str());
        context.set(context_keys::PROJECT_NAME, request.project_name.as_str());
        context.set(context_keys::APP_NAME, request.app_name.as_str());
        context.set(
            context_keys::APP_DIR,
            request.project_dir.display().to_string(),
        );
        context.set(context_keys::BILLING_ACCOUNT, request.billing_account.as_str());
        context.set_serialized(context_keys::RESOURCE_NAMES, &names);
        debug!(
            project_id = %request.project_id,
            resources = ?names.descriptors(),
            "📋 Resources this run will create or reuse"
        );

        let p = &self.provisioners;
        let defaults = &self.config.defaults;
        let steps: Vec<Box<dyn PipelineStep>> = vec![
            Box::new(ProjectStep {
                provisioner: p.project.clone(),
                mode: request.mode,
            }),
            Box::new(BillingStep {
                provisioner: p.billing.clone(),
            }),
            Box::new(SourceGenerationStep {
                generator: self.clients.source_generator.clone(),
                defaults: defaults.clone(),
                database_password: request.database_password.clone(),
                proxy_secrets: self.config.secret_names(PROXY_ACCOUNT_GROUP),
                app_secrets: self.config.secret_names(APP_ACCOUNT_GROUP),
            }),
            Box::new(DatabaseStep {
                provisioner: p.database.clone(),
                defaults: defaults.clone(),
                password: request.database_password.clone(),
                superuser: request.superuser.clone(),
            }),
            Box::new(EnableServicesStep {
                enabler: p.services.clone(),
                services: self.config.services.clone(),
            }),
            Box::new(StaticContentStep {
                storage: p.storage.clone(),
            }),
            Box::new(ServiceAccountsStep {
                provisioner: p.service_accounts.clone(),
                accounts: self.config.service_accounts.clone(),
            }),
            Box::new(DeployStep {
                driver: self.driver(request.backend),
                defaults: defaults.clone(),
            }),
        ];

        PipelineRun::new(Lifecycle::Create, steps, context)
    }

    /// The update pipeline for an application described by `record`.
    pub fn update_pipeline(
        &self,
        app_dir: &Path,
        record: &DeploymentRecord,
        database_password: &str,
    ) -> PipelineRun {
        let names = ResourceNames::derive(&record.project_id, &record.django_project_name, None);
        let mut context = PipelineContext::new();
        context.set(context_keys::PROJECT_ID, record.project_id.as_str());
        context.set(context_keys::APP_NAME, record.django_project_name.as_str());
        context.set(context_keys::APP_DIR, app_dir.display().to_string());
        context.set_serialized(context_keys::RESOURCE_NAMES, &names);

        let p = &self.provisioners;
        let defaults = &self.config.defaults;
        let steps: Vec<Box<dyn PipelineStep>> = vec![
            Box::new(DatabaseMigrateStep {
                provisioner: p.database.clone(),
                defaults: defaults.clone(),
                password: database_password.to_string(),
            }),
            Box::new(StaticContentUpdateStep {
                storage: p.storage.clone(),
            }),
            Box::new(DeployUpdateStep {
                driver: self.driver(record.backend),
                defaults: defaults.clone(),
            }),
        ];

        PipelineRun::new(Lifecycle::Update, steps, context)
    }

    /// Provision everything, deploy, and persist the deployment record.
    /// Returns the application URL.
    pub async fn create_and_deploy(&self, request: CreateRequest) -> ProvisionResult<String> {
        let mut run = self.create_pipeline(&request);
        run.run().await?;

        let context = run.into_context();
        let url = context.require_str("deploy", context_keys::APP_URL)?.to_string();
        let app_dir = context.app_dir("deploy")?;

        let record = DeploymentRecord {
            project_id: context.project_id("deploy")?.to_string(),
            django_project_name: request.app_name.clone(),
            backend: request.backend,
        };
        self.records.save(&app_dir, &record).await?;

        info!(project_id = %record.project_id, backend = %record.backend, url = %url, "🎉 Application is live");
        Ok(url)
    }

    /// Redeploy an application created earlier. Returns the application URL.
    pub async fn update(&self, request: UpdateRequest) -> ProvisionResult<String> {
        let record = self.records.load(&request.app_dir).await?;
        let mut run = self.update_pipeline(&request.app_dir, &record, &request.database_password);
        run.run().await?;

        let url = run
            .context()
            .require_str("deploy_update", context_keys::APP_URL)?
            .to_string();
        info!(project_id = %record.project_id, backend = %record.backend, url = %url, "🎉 Application updated");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_debug_hides_passwords() {
        let request = UpdateRequest {
            app_dir: PathBuf::from("/tmp/shop"),
            database_password: "hunter2".to_string(),
        };
        let rendered = format!("{request:?}");
        assert!(rendered.contains("/tmp/shop"));
        assert!(!rendered.contains("hunter2"));
    }
}
