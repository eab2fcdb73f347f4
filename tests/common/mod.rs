//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use cloud_deploy_core::adapters::{CloudScript, InMemoryCloud};
use cloud_deploy_core::clients::Superuser;
use cloud_deploy_core::config::DeployConfig;
use cloud_deploy_core::constants::{Backend, CreationMode};
use cloud_deploy_core::orchestration::{CreateRequest, WorkflowManager};
use cloud_deploy_core::provisioners::Provisioners;
use std::path::Path;
use std::sync::Arc;

pub const PROJECT_ID: &str = "demo-123456";
pub const APP_NAME: &str = "shop";
pub const BILLING_ACCOUNT: &str = "billingAccounts/000000-AAAAAA-000000";

/// Defaults with millisecond intervals; tests also run on paused time.
pub fn fast_config() -> DeployConfig {
    let mut config = DeployConfig::default();
    config.polling.cloud_interval_ms = 10;
    config.polling.reachability_interval_ms = 5;
    config.polling.reachability_max_polls = 20;
    config.polling.project_confirm_interval_ms = 10;
    config.retry.backoff.base_delay_ms = 10;
    config.retry.backoff.max_delay_ms = 100;
    config
}

pub fn cloud() -> Arc<InMemoryCloud> {
    Arc::new(InMemoryCloud::new())
}

pub fn scripted_cloud(script: CloudScript) -> Arc<InMemoryCloud> {
    Arc::new(InMemoryCloud::with_script(script))
}

pub fn provisioners(cloud: &Arc<InMemoryCloud>) -> Provisioners {
    Provisioners::new(&cloud.clients(), &fast_config())
}

pub fn manager(cloud: &Arc<InMemoryCloud>) -> WorkflowManager {
    WorkflowManager::new(cloud.clients(), fast_config())
}

pub fn manager_with(cloud: &Arc<InMemoryCloud>, config: DeployConfig) -> WorkflowManager {
    WorkflowManager::new(cloud.clients(), config)
}

pub fn create_request(project_dir: &Path, backend: Backend, mode: CreationMode) -> CreateRequest {
    CreateRequest {
        project_id: PROJECT_ID.to_string(),
        project_name: "Demo Shop".to_string(),
        app_name: APP_NAME.to_string(),
        project_dir: project_dir.to_path_buf(),
        mode,
        billing_account: BILLING_ACCOUNT.to_string(),
        backend,
        database_password: "db-password".to_string(),
        superuser: Superuser {
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password: "admin-password".to_string(),
        },
        bucket_name: None,
    }
}

/// Position of the first journal entry named `call`.
pub fn first_call(names: &[&'static str], call: &str) -> usize {
    names
        .iter()
        .position(|name| *name == call)
        .unwrap_or_else(|| panic!("{call} was never called; journal: {names:?}"))
}
