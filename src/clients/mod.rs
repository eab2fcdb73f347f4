//! # Control-Plane Clients
//!
//! One small interface per resource kind. Provisioners and drivers depend on
//! these traits only; concrete adapters live in [`crate::adapters`].
//!
//! Every method returns an [`ApiError`](crate::error::ApiError) classified as
//! not-found, permission-denied, conflict, invalid-argument or unknown, which
//! is all the provisioners need to apply their reuse rules.

pub mod types;

use crate::error::ApiResult;
use crate::policy::PolicyDocument;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use types::*;

#[async_trait]
pub trait ProjectApi: Send + Sync {
    async fn get_project(&self, project_id: &str) -> ApiResult<ProjectInfo>;
    async fn create_project(&self, project_id: &str, name: &str) -> ApiResult<ProjectInfo>;
}

#[async_trait]
pub trait BillingApi: Send + Sync {
    async fn get_billing_info(&self, project_id: &str) -> ApiResult<BillingInfo>;
    async fn update_billing_info(
        &self,
        project_id: &str,
        billing_account: &str,
    ) -> ApiResult<BillingInfo>;
    async fn list_billing_accounts(&self) -> ApiResult<Vec<BillingAccount>>;
}

#[async_trait]
pub trait SqlAdminApi: Send + Sync {
    async fn insert_instance(
        &self,
        project_id: &str,
        definition: &InstanceDefinition,
    ) -> ApiResult<()>;
    async fn get_instance(&self, project_id: &str, instance: &str) -> ApiResult<SqlInstance>;
    async fn insert_database(
        &self,
        project_id: &str,
        instance: &str,
        database: &str,
    ) -> ApiResult<SqlOperation>;
    async fn get_database(
        &self,
        project_id: &str,
        instance: &str,
        database: &str,
    ) -> ApiResult<SqlOperation>;
    async fn set_user_password(
        &self,
        project_id: &str,
        instance: &str,
        user: &str,
        password: &str,
    ) -> ApiResult<SqlOperation>;
}

#[async_trait]
pub trait ServiceUsageApi: Send + Sync {
    async fn enable_service(&self, project_id: &str, service: &str) -> ApiResult<ServiceState>;
    async fn get_service(&self, project_id: &str, service: &str) -> ApiResult<ServiceState>;
}

#[async_trait]
pub trait IamApi: Send + Sync {
    async fn create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        display_name: &str,
    ) -> ApiResult<ServiceAccount>;
    async fn create_key(&self, project_id: &str, email: &str) -> ApiResult<ServiceAccountKey>;
    async fn get_project_policy(&self, project_id: &str) -> ApiResult<PolicyDocument>;
    async fn set_project_policy(
        &self,
        project_id: &str,
        policy: &PolicyDocument,
    ) -> ApiResult<PolicyDocument>;
}

#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn insert_bucket(&self, project_id: &str, bucket: &str) -> ApiResult<Bucket>;
    async fn list_buckets(&self, project_id: &str) -> ApiResult<Vec<Bucket>>;
    async fn get_bucket_policy(&self, bucket: &str) -> ApiResult<PolicyDocument>;
    async fn set_bucket_policy(
        &self,
        bucket: &str,
        policy: &PolicyDocument,
    ) -> ApiResult<PolicyDocument>;
    async fn upload_object(&self, bucket: &str, object: &str, source: &Path) -> ApiResult<()>;
}

#[async_trait]
pub trait ContainerApi: Send + Sync {
    async fn default_cluster_version(&self, project_id: &str, zone: &str) -> ApiResult<String>;
    async fn create_cluster(
        &self,
        project_id: &str,
        zone: &str,
        definition: &ClusterDefinition,
    ) -> ApiResult<()>;
    async fn get_cluster(&self, project_id: &str, zone: &str, name: &str) -> ApiResult<Cluster>;
}

/// Builds and publishes the application image.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, tag: &str, context_dir: &Path) -> ApiResult<()>;
    async fn push(&self, tag: &str) -> ApiResult<()>;
}

#[async_trait]
pub trait KubernetesApi: Send + Sync {
    async fn create_secret(
        &self,
        access: &ClusterAccess,
        namespace: &str,
        secret: &KubeSecret,
    ) -> ApiResult<()>;
    async fn create_deployment(
        &self,
        access: &ClusterAccess,
        namespace: &str,
        deployment: &serde_json::Value,
    ) -> ApiResult<()>;
    async fn patch_deployment(
        &self,
        access: &ClusterAccess,
        namespace: &str,
        name: &str,
        deployment: &serde_json::Value,
    ) -> ApiResult<()>;
    async fn create_service(
        &self,
        access: &ClusterAccess,
        namespace: &str,
        service: &serde_json::Value,
    ) -> ApiResult<()>;
    /// Ready replicas across deployments matching `label_selector`.
    async fn ready_replicas(&self, access: &ClusterAccess, label_selector: &str)
        -> ApiResult<u32>;
    /// Hostnames or IPs published by load balancers matching `label_selector`.
    async fn ingress_addresses(
        &self,
        access: &ClusterAccess,
        label_selector: &str,
    ) -> ApiResult<Vec<String>>;
}

#[async_trait]
pub trait AppEngineApi: Send + Sync {
    async fn get_app(&self, project_id: &str) -> ApiResult<ManagedApp>;
    async fn create_app(&self, project_id: &str, location: &str) -> ApiResult<AppOperation>;
    async fn get_operation(&self, project_id: &str, operation_id: &str)
        -> ApiResult<AppOperation>;
}

/// Ships an application package to the managed platform.
#[async_trait]
pub trait AppDeployer: Send + Sync {
    async fn deploy(&self, project_id: &str, app_yaml: &Path) -> ApiResult<()>;
}

/// Produces the application source tree.
#[async_trait]
pub trait SourceGenerator: Send + Sync {
    async fn generate(&self, spec: &SourceSpec) -> ApiResult<PathBuf>;
}

/// Runs schema migrations and account setup against the application database.
#[async_trait]
pub trait DatabaseTooling: Send + Sync {
    async fn migrate(&self, target: &DatabaseTarget) -> ApiResult<()>;
    async fn superuser_exists(&self, target: &DatabaseTarget, username: &str) -> ApiResult<bool>;
    async fn create_superuser(&self, target: &DatabaseTarget, superuser: &Superuser)
        -> ApiResult<()>;
}

/// Gathers the application's static files into its static directory.
#[async_trait]
pub trait StaticCollector: Send + Sync {
    async fn collect(&self, app_dir: &Path) -> ApiResult<()>;
}

/// Every collaborator the orchestrator talks to.
#[derive(Clone)]
pub struct CloudClients {
    pub projects: Arc<dyn ProjectApi>,
    pub billing: Arc<dyn BillingApi>,
    pub sql: Arc<dyn SqlAdminApi>,
    pub services: Arc<dyn ServiceUsageApi>,
    pub iam: Arc<dyn IamApi>,
    pub storage: Arc<dyn StorageApi>,
    pub container: Arc<dyn ContainerApi>,
    pub kubernetes: Arc<dyn KubernetesApi>,
    pub images: Arc<dyn ImageBuilder>,
    pub app_engine: Arc<dyn AppEngineApi>,
    pub app_deployer: Arc<dyn AppDeployer>,
    pub source_generator: Arc<dyn SourceGenerator>,
    pub database_tooling: Arc<dyn DatabaseTooling>,
    pub static_collector: Arc<dyn StaticCollector>,
}
