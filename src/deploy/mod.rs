//! # Deployment Drivers
//!
//! Materialize the built application onto a compute target and report the
//! URL it is reachable at.
//!
//! ## Architecture
//!
//! Both backends implement [`DeploymentDriver`]:
//!
//! - [`ClusterDriver`] builds and pushes an image, applies the workload
//!   manifest and waits for ready replicas and an ingress address.
//! - [`ManagedAppDriver`] creates the platform application when needed and
//!   runs the deploy command under a bounded retry.
//!
//! The orchestrator picks one through [`driver_for`] using the backend
//! stored in the deployment record.

pub mod cluster;
pub mod managed_app;
pub mod manifest;
pub mod secrets;

pub use cluster::ClusterDriver;
pub use managed_app::ManagedAppDriver;
pub use manifest::{managed_app_service, managed_app_url, WorkloadManifest};
pub use secrets::SecretsPayload;

use crate::clients::CloudClients;
use crate::config::DeployConfig;
use crate::constants::Backend;
use crate::error::ProvisionResult;
use crate::naming::ResourceNames;
use crate::provisioners::Provisioners;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a driver needs to know about the application being deployed.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub project_id: String,
    /// Application name as used by the generated source tree
    pub app_name: String,
    pub app_dir: PathBuf,
    pub names: ResourceNames,
    /// Empty on update runs
    pub secrets: SecretsPayload,
    pub region: String,
    pub zone: String,
    /// Region of the managed application
    pub app_region: String,
}

impl DeployContext {
    /// Label selecting the workload's pods and load balancer.
    pub fn label_selector(&self) -> String {
        format!("app={}", self.app_name)
    }
}

#[async_trait]
pub trait DeploymentDriver: Send + Sync {
    fn backend(&self) -> Backend;

    /// First deployment onto freshly provisioned infrastructure.
    async fn deploy(&self, ctx: &DeployContext) -> ProvisionResult<String>;

    /// Ship a new build onto infrastructure created by an earlier deploy.
    async fn update(&self, ctx: &DeployContext) -> ProvisionResult<String>;
}

pub fn driver_for(
    backend: Backend,
    clients: &CloudClients,
    provisioners: &Provisioners,
    config: &DeployConfig,
) -> Arc<dyn DeploymentDriver> {
    match backend {
        Backend::Cluster => Arc::new(ClusterDriver::new(
            provisioners.cluster.clone(),
            clients.images.clone(),
            clients.kubernetes.clone(),
            config.polling.reachability_policy(),
            config.rollout,
            config.defaults.namespace.clone(),
        )),
        Backend::ManagedApp => Arc::new(ManagedAppDriver::new(
            provisioners.managed_app.clone(),
            provisioners.storage.clone(),
            clients.app_deployer.clone(),
            config.retry.deploy_policy(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryCloud;

    #[test]
    fn driver_matches_backend() {
        let cloud = Arc::new(InMemoryCloud::new());
        let clients = cloud.clients();
        let config = DeployConfig::default();
        let provisioners = Provisioners::new(&clients, &config);

        for backend in [Backend::Cluster, Backend::ManagedApp] {
            let driver = driver_for(backend, &clients, &provisioners, &config);
            assert_eq!(driver.backend(), backend);
        }
    }
}
