//! # In-Memory Control Plane
//!
//! A complete stand-in for every client interface. Long-running resources
//! walk through scripted status sequences, any call can be made to fail, and
//! every call lands in an ordered journal. Used by the test suites and for
//! dry runs.
//!
//! ## Usage
//!
//! ```rust
//! use cloud_deploy_core::adapters::InMemoryCloud;
//! use cloud_deploy_core::clients::ProjectApi;
//! use cloud_deploy_core::error::ApiError;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let cloud = Arc::new(InMemoryCloud::new());
//! cloud.fail_next("get_project", ApiError::unknown("transient"));
//! let clients = cloud.clients();
//!
//! assert!(clients.projects.get_project("demo-123456").await.is_err());
//! assert_eq!(cloud.call_count("get_project"), 1);
//! # });
//! ```

use crate::clients::*;
use crate::error::{ApiError, ApiResult};
use crate::policy::PolicyDocument;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::{Mutex, MutexGuard};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Status sequences and delays the fake resources follow. The last status of
/// each sequence sticks.
#[derive(Debug, Clone)]
pub struct CloudScript {
    pub instance_statuses: Vec<String>,
    /// The first status is returned by the insert call itself
    pub database_statuses: Vec<String>,
    pub service_statuses: Vec<String>,
    pub cluster_statuses: Vec<String>,
    /// Polls answered "not done" before an app creation finishes
    pub app_operation_pending_polls: u32,
    /// Readiness checks answered with zero replicas
    pub unready_replica_polls: u32,
    /// Ingress checks answered with no address
    pub missing_ingress_polls: u32,
    pub ingress_address: String,
    pub default_cluster_version: String,
}

fn statuses(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for CloudScript {
    fn default() -> Self {
        Self {
            instance_statuses: statuses(&["PENDING_CREATE", "RUNNABLE"]),
            database_statuses: statuses(&["PENDING", "DONE"]),
            service_statuses: statuses(&["DISABLED", "ENABLED"]),
            cluster_statuses: statuses(&["PROVISIONING", "RUNNING"]),
            app_operation_pending_polls: 1,
            unready_replica_polls: 1,
            missing_ingress_polls: 1,
            ingress_address: "203.0.113.10".to_string(),
            default_cluster_version: "1.27.3-gke.100".to_string(),
        }
    }
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: &'static str,
    pub target: String,
}

#[derive(Debug, Default)]
struct CloudState {
    projects: BTreeMap<String, ProjectInfo>,
    foreign_projects: BTreeSet<String>,
    billing: BTreeMap<String, BillingInfo>,
    billing_accounts: Vec<BillingAccount>,
    instances: BTreeMap<String, VecDeque<String>>,
    databases: BTreeMap<String, VecDeque<String>>,
    passwords: BTreeMap<String, String>,
    services: BTreeMap<String, VecDeque<String>>,
    service_accounts: BTreeMap<String, ServiceAccount>,
    project_policies: BTreeMap<String, PolicyDocument>,
    buckets: BTreeMap<String, Bucket>,
    bucket_policies: BTreeMap<String, PolicyDocument>,
    objects: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    clusters: BTreeMap<String, VecDeque<String>>,
    built_images: BTreeSet<String>,
    pushed_images: Vec<String>,
    secrets: BTreeMap<String, KubeSecret>,
    deployments: BTreeMap<String, Value>,
    deployment_patches: Vec<Value>,
    kube_services: BTreeMap<String, Value>,
    replica_polls: u32,
    ingress_polls: u32,
    apps: BTreeMap<String, ManagedApp>,
    app_operations: BTreeMap<String, u32>,
    app_deploys: Vec<(String, PathBuf)>,
    migrations: u32,
    superusers: BTreeSet<String>,
    static_collections: u32,
    source_specs: Vec<SourceSpec>,
    journal: Vec<Call>,
    failures: BTreeMap<&'static str, VecDeque<ApiError>>,
}

/// Pop the next status, keeping the last one in place.
fn advance(queue: &mut VecDeque<String>) -> String {
    if queue.len() > 1 {
        queue.pop_front().unwrap_or_default()
    } else {
        queue.front().cloned().unwrap_or_default()
    }
}

fn next_etag(current: Option<&str>) -> String {
    let n = current
        .and_then(|tag| tag.strip_prefix("etag-"))
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("etag-{}", n + 1)
}

fn write_policy(
    store: &mut BTreeMap<String, PolicyDocument>,
    key: &str,
    policy: &PolicyDocument,
) -> ApiResult<PolicyDocument> {
    let current = store.get(key).and_then(|p| p.etag.clone());
    if policy.etag != current {
        return Err(ApiError::conflict(format!(
            "policy of {key} changed since it was read"
        )));
    }
    let mut stored = policy.clone();
    stored.etag = Some(next_etag(current.as_deref()));
    store.insert(key.to_string(), stored.clone());
    Ok(stored)
}

fn valid_account_id(id: &str) -> bool {
    (6..=30).contains(&id.len())
        && id.starts_with(|c: char| c.is_ascii_lowercase())
        && !id.ends_with('-')
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn io_error(path: &Path, e: std::io::Error) -> ApiError {
    ApiError::unknown(format!("{}: {e}", path.display()))
}

pub struct InMemoryCloud {
    script: CloudScript,
    state: Mutex<CloudState>,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::with_script(CloudScript::default())
    }

    pub fn with_script(script: CloudScript) -> Self {
        let state = CloudState {
            billing_accounts: vec![
                BillingAccount {
                    name: "billingAccounts/000000-AAAAAA-000000".to_string(),
                    display_name: "Primary".to_string(),
                    open: true,
                },
                BillingAccount {
                    name: "billingAccounts/000000-BBBBBB-000000".to_string(),
                    display_name: "Closed".to_string(),
                    open: false,
                },
            ],
            ..CloudState::default()
        };
        Self {
            script,
            state: Mutex::new(state),
        }
    }

    /// Every client interface backed by this control plane.
    pub fn clients(self: &Arc<Self>) -> CloudClients {
        CloudClients {
            projects: self.clone(),
            billing: self.clone(),
            sql: self.clone(),
            services: self.clone(),
            iam: self.clone(),
            storage: self.clone(),
            container: self.clone(),
            kubernetes: self.clone(),
            images: self.clone(),
            app_engine: self.clone(),
            app_deployer: self.clone(),
            source_generator: self.clone(),
            database_tooling: self.clone(),
            static_collector: self.clone(),
        }
    }

    /// Journal the call and return the injected failure, if any.
    fn enter(&self, name: &'static str, target: &str) -> ApiResult<MutexGuard<'_, CloudState>> {
        let mut state = self.state.lock();
        state.journal.push(Call {
            name,
            target: target.to_string(),
        });
        if let Some(error) = state.failures.get_mut(name).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(state)
    }

    /// Fail the next `times` calls named `call` with `error`.
    pub fn fail_times(&self, call: &'static str, times: usize, error: ApiError) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(call).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    pub fn fail_next(&self, call: &'static str, error: ApiError) {
        self.fail_times(call, 1, error);
    }

    pub fn add_project(&self, project_id: &str, name: &str) {
        self.state.lock().projects.insert(
            project_id.to_string(),
            ProjectInfo {
                project_id: project_id.to_string(),
                name: name.to_string(),
            },
        );
    }

    /// A project owned by someone else: visible only as permission denied.
    pub fn add_foreign_project(&self, project_id: &str) {
        self.state
            .lock()
            .foreign_projects
            .insert(project_id.to_string());
    }

    /// A bucket whose globally unique name belongs to `owner_project`.
    pub fn add_bucket(&self, bucket: &str, owner_project: &str) {
        self.state.lock().buckets.insert(
            bucket.to_string(),
            Bucket {
                name: bucket.to_string(),
                project_id: owner_project.to_string(),
            },
        );
    }

    pub fn add_object(&self, bucket: &str, object: &str, content: &[u8]) {
        self.state
            .lock()
            .objects
            .entry(bucket.to_string())
            .or_default()
            .insert(object.to_string(), content.to_vec());
    }

    pub fn journal(&self) -> Vec<Call> {
        self.state.lock().journal.clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.state.lock().journal.iter().map(|c| c.name).collect()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|c| c.name == name)
            .count()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    pub fn project_exists(&self, project_id: &str) -> bool {
        self.state.lock().projects.contains_key(project_id)
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.state.lock().projects.keys().cloned().collect()
    }

    pub fn billing_enabled(&self, project_id: &str) -> bool {
        self.state
            .lock()
            .billing
            .get(project_id)
            .and_then(|b| b.billing_enabled)
            .unwrap_or(false)
    }

    pub fn bucket_owner(&self, bucket: &str) -> Option<String> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .map(|b| b.project_id.clone())
    }

    pub fn object_names(&self, bucket: &str) -> Vec<String> {
        self.state
            .lock()
            .objects
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, object: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .objects
            .get(bucket)
            .and_then(|objects| objects.get(object).cloned())
    }

    pub fn bucket_policy(&self, bucket: &str) -> Option<PolicyDocument> {
        self.state.lock().bucket_policies.get(bucket).cloned()
    }

    pub fn project_policy(&self, project_id: &str) -> Option<PolicyDocument> {
        self.state.lock().project_policies.get(project_id).cloned()
    }

    pub fn service_account_emails(&self) -> Vec<String> {
        self.state.lock().service_accounts.keys().cloned().collect()
    }

    /// Every spec handed to the source generator, in call order.
    pub fn source_specs(&self) -> Vec<SourceSpec> {
        self.state.lock().source_specs.clone()
    }

    pub fn secret(&self, name: &str) -> Option<KubeSecret> {
        self.state.lock().secrets.get(name).cloned()
    }

    pub fn deployment(&self, name: &str) -> Option<Value> {
        self.state.lock().deployments.get(name).cloned()
    }

    pub fn deployment_patches(&self) -> Vec<Value> {
        self.state.lock().deployment_patches.clone()
    }

    pub fn pushed_images(&self) -> Vec<String> {
        self.state.lock().pushed_images.clone()
    }

    pub fn app_deploys(&self) -> Vec<(String, PathBuf)> {
        self.state.lock().app_deploys.clone()
    }

    pub fn managed_app(&self, project_id: &str) -> Option<ManagedApp> {
        self.state.lock().apps.get(project_id).cloned()
    }

    pub fn migrations(&self) -> u32 {
        self.state.lock().migrations
    }

    pub fn superusers(&self) -> Vec<String> {
        self.state.lock().superusers.iter().cloned().collect()
    }
}

#[async_trait]
impl ProjectApi for InMemoryCloud {
    async fn get_project(&self, project_id: &str) -> ApiResult<ProjectInfo> {
        let state = self.enter("get_project", project_id)?;
        if state.foreign_projects.contains(project_id) {
            return Err(ApiError::permission_denied(format!(
                "caller lacks access to {project_id}"
            )));
        }
        state
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("project {project_id}")))
    }

    async fn create_project(&self, project_id: &str, name: &str) -> ApiResult<ProjectInfo> {
        let mut state = self.enter("create_project", project_id)?;
        if state.projects.contains_key(project_id) || state.foreign_projects.contains(project_id) {
            return Err(ApiError::conflict(format!("project {project_id} exists")));
        }
        let info = ProjectInfo {
            project_id: project_id.to_string(),
            name: name.to_string(),
        };
        state.projects.insert(project_id.to_string(), info.clone());
        Ok(info)
    }
}

#[async_trait]
impl BillingApi for InMemoryCloud {
    async fn get_billing_info(&self, project_id: &str) -> ApiResult<BillingInfo> {
        let state = self.enter("get_billing_info", project_id)?;
        Ok(state
            .billing
            .get(project_id)
            .cloned()
            .unwrap_or_else(|| BillingInfo {
                project_id: project_id.to_string(),
                billing_account_name: None,
                billing_enabled: Some(false),
            }))
    }

    async fn update_billing_info(
        &self,
        project_id: &str,
        billing_account: &str,
    ) -> ApiResult<BillingInfo> {
        let mut state = self.enter("update_billing_info", project_id)?;
        if !state.billing_accounts.iter().any(|a| a.name == billing_account && a.open) {
            return Err(ApiError::invalid_argument(format!(
                "billing account {billing_account} is not open"
            )));
        }
        let info = BillingInfo {
            project_id: project_id.to_string(),
            billing_account_name: Some(billing_account.to_string()),
            billing_enabled: Some(true),
        };
        state.billing.insert(project_id.to_string(), info.clone());
        Ok(info)
    }

    async fn list_billing_accounts(&self) -> ApiResult<Vec<BillingAccount>> {
        let state = self.enter("list_billing_accounts", "")?;
        Ok(state.billing_accounts.clone())
    }
}

#[async_trait]
impl SqlAdminApi for InMemoryCloud {
    async fn insert_instance(
        &self,
        project_id: &str,
        definition: &InstanceDefinition,
    ) -> ApiResult<()> {
        let key = format!("{project_id}/{}", definition.name);
        let mut state = self.enter("insert_instance", &key)?;
        if state.instances.contains_key(&key) {
            return Err(ApiError::conflict(format!("instance {} exists", definition.name)));
        }
        state
            .instances
            .insert(key, self.script.instance_statuses.iter().cloned().collect());
        Ok(())
    }

    async fn get_instance(&self, project_id: &str, instance: &str) -> ApiResult<SqlInstance> {
        let key = format!("{project_id}/{instance}");
        let mut state = self.enter("get_instance", &key)?;
        let queue = state
            .instances
            .get_mut(&key)
            .ok_or_else(|| ApiError::not_found(format!("instance {instance}")))?;
        Ok(SqlInstance {
            name: instance.to_string(),
            state: advance(queue),
        })
    }

    async fn insert_database(
        &self,
        project_id: &str,
        instance: &str,
        database: &str,
    ) -> ApiResult<SqlOperation> {
        let key = format!("{project_id}/{instance}/{database}");
        let mut state = self.enter("insert_database", &key)?;
        if !state.instances.contains_key(&format!("{project_id}/{instance}")) {
            return Err(ApiError::not_found(format!("instance {instance}")));
        }
        if state.databases.contains_key(&key) {
            return Err(ApiError::conflict(format!("database {database} exists")));
        }
        let mut queue: VecDeque<String> = self.script.database_statuses.iter().cloned().collect();
        let status = advance(&mut queue);
        state.databases.insert(key, queue);
        Ok(SqlOperation { status })
    }

    async fn get_database(
        &self,
        project_id: &str,
        instance: &str,
        database: &str,
    ) -> ApiResult<SqlOperation> {
        let key = format!("{project_id}/{instance}/{database}");
        let mut state = self.enter("get_database", &key)?;
        let queue = state
            .databases
            .get_mut(&key)
            .ok_or_else(|| ApiError::not_found(format!("database {database}")))?;
        Ok(SqlOperation {
            status: advance(queue),
        })
    }

    async fn set_user_password(
        &self,
        project_id: &str,
        instance: &str,
        user: &str,
        password: &str,
    ) -> ApiResult<SqlOperation> {
        let key = format!("{project_id}/{instance}");
        let mut state = self.enter("set_user_password", &key)?;
        if !state.instances.contains_key(&key) {
            return Err(ApiError::not_found(format!("instance {instance}")));
        }
        state
            .passwords
            .insert(format!("{key}/{user}"), password.to_string());
        Ok(SqlOperation {
            status: "DONE".to_string(),
        })
    }
}

#[async_trait]
impl ServiceUsageApi for InMemoryCloud {
    async fn enable_service(&self, project_id: &str, service: &str) -> ApiResult<ServiceState> {
        let key = format!("{project_id}/{service}");
        let mut state = self.enter("enable_service", &key)?;
        let script = &self.script.service_statuses;
        let queue = state
            .services
            .entry(key)
            .or_insert_with(|| script.iter().cloned().collect());
        Ok(ServiceState {
            name: format!("projects/{project_id}/services/{service}"),
            state: queue.front().cloned().unwrap_or_default(),
        })
    }

    async fn get_service(&self, project_id: &str, service: &str) -> ApiResult<ServiceState> {
        let key = format!("{project_id}/{service}");
        let mut state = self.enter("get_service", &key)?;
        let queue = state
            .services
            .get_mut(&key)
            .ok_or_else(|| ApiError::not_found(format!("service {service}")))?;
        Ok(ServiceState {
            name: format!("projects/{project_id}/services/{service}"),
            state: advance(queue),
        })
    }
}

#[async_trait]
impl IamApi for InMemoryCloud {
    async fn create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        _display_name: &str,
    ) -> ApiResult<ServiceAccount> {
        let mut state = self.enter("create_service_account", account_id)?;
        if !valid_account_id(account_id) {
            return Err(ApiError::invalid_argument(format!(
                "account id {account_id} must be 6-30 lowercase letters, digits or hyphens"
            )));
        }
        let email = format!("{account_id}@{project_id}.iam.gserviceaccount.com");
        if state.service_accounts.contains_key(&email) {
            return Err(ApiError::conflict(format!("{email} exists")));
        }
        let account = ServiceAccount {
            name: format!("projects/{project_id}/serviceAccounts/{email}"),
            email: email.clone(),
        };
        state.service_accounts.insert(email, account.clone());
        Ok(account)
    }

    async fn create_key(&self, _project_id: &str, email: &str) -> ApiResult<ServiceAccountKey> {
        let state = self.enter("create_key", email)?;
        if !state.service_accounts.contains_key(email) {
            return Err(ApiError::not_found(format!("service account {email}")));
        }
        let key_file = json!({"type": "service_account", "client_email": email}).to_string();
        Ok(ServiceAccountKey {
            private_key_data: STANDARD.encode(key_file.as_bytes()),
        })
    }

    async fn get_project_policy(&self, project_id: &str) -> ApiResult<PolicyDocument> {
        let state = self.enter("get_project_policy", project_id)?;
        Ok(state
            .project_policies
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_project_policy(
        &self,
        project_id: &str,
        policy: &PolicyDocument,
    ) -> ApiResult<PolicyDocument> {
        let mut state = self.enter("set_project_policy", project_id)?;
        write_policy(&mut state.project_policies, project_id, policy)
    }
}

#[async_trait]
impl StorageApi for InMemoryCloud {
    async fn insert_bucket(&self, project_id: &str, bucket: &str) -> ApiResult<Bucket> {
        let mut state = self.enter("insert_bucket", bucket)?;
        if state.buckets.contains_key(bucket) {
            return Err(ApiError::conflict(format!("bucket {bucket} exists")));
        }
        let created = Bucket {
            name: bucket.to_string(),
            project_id: project_id.to_string(),
        };
        state.buckets.insert(bucket.to_string(), created.clone());
        Ok(created)
    }

    async fn list_buckets(&self, project_id: &str) -> ApiResult<Vec<Bucket>> {
        let state = self.enter("list_buckets", project_id)?;
        Ok(state
            .buckets
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> ApiResult<PolicyDocument> {
        let state = self.enter("get_bucket_policy", bucket)?;
        if !state.buckets.contains_key(bucket) {
            return Err(ApiError::not_found(format!("bucket {bucket}")));
        }
        Ok(state
            .bucket_policies
            .get(bucket)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_bucket_policy(
        &self,
        bucket: &str,
        policy: &PolicyDocument,
    ) -> ApiResult<PolicyDocument> {
        let mut state = self.enter("set_bucket_policy", bucket)?;
        write_policy(&mut state.bucket_policies, bucket, policy)
    }

    async fn upload_object(&self, bucket: &str, object: &str, source: &Path) -> ApiResult<()> {
        drop(self.enter("upload_object", &format!("{bucket}/{object}"))?);
        let content = tokio::fs::read(source)
            .await
            .map_err(|e| io_error(source, e))?;

        let mut state = self.state.lock();
        if !state.buckets.contains_key(bucket) {
            return Err(ApiError::not_found(format!("bucket {bucket}")));
        }
        state
            .objects
            .entry(bucket.to_string())
            .or_default()
            .insert(object.to_string(), content);
        Ok(())
    }
}

#[async_trait]
impl ContainerApi for InMemoryCloud {
    async fn default_cluster_version(&self, _project_id: &str, zone: &str) -> ApiResult<String> {
        drop(self.enter("default_cluster_version", zone)?);
        Ok(self.script.default_cluster_version.clone())
    }

    async fn create_cluster(
        &self,
        project_id: &str,
        zone: &str,
        definition: &ClusterDefinition,
    ) -> ApiResult<()> {
        let key = format!("{project_id}/{zone}/{}", definition.name);
        let mut state = self.enter("create_cluster", &key)?;
        if state.clusters.contains_key(&key) {
            return Err(ApiError::conflict(format!("cluster {} exists", definition.name)));
        }
        state
            .clusters
            .insert(key, self.script.cluster_statuses.iter().cloned().collect());
        Ok(())
    }

    async fn get_cluster(&self, project_id: &str, zone: &str, name: &str) -> ApiResult<Cluster> {
        let key = format!("{project_id}/{zone}/{name}");
        let mut state = self.enter("get_cluster", &key)?;
        let queue = state
            .clusters
            .get_mut(&key)
            .ok_or_else(|| ApiError::not_found(format!("cluster {name}")))?;
        Ok(Cluster {
            name: name.to_string(),
            status: advance(queue),
            endpoint: Some("198.51.100.1".to_string()),
            cluster_ca_certificate: Some(STANDARD.encode(b"in-memory cluster CA")),
        })
    }
}

#[async_trait]
impl ImageBuilder for InMemoryCloud {
    async fn build(&self, tag: &str, context_dir: &Path) -> ApiResult<()> {
        let mut state = self.enter("build_image", tag)?;
        if !context_dir.is_dir() {
            return Err(ApiError::invalid_argument(format!(
                "build context {} does not exist",
                context_dir.display()
            )));
        }
        state.built_images.insert(tag.to_string());
        Ok(())
    }

    async fn push(&self, tag: &str) -> ApiResult<()> {
        let mut state = self.enter("push_image", tag)?;
        if !state.built_images.contains(tag) {
            return Err(ApiError::not_found(format!("image {tag} was never built")));
        }
        state.pushed_images.push(tag.to_string());
        Ok(())
    }
}

fn manifest_name(document: &Value) -> String {
    document
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl KubernetesApi for InMemoryCloud {
    async fn create_secret(
        &self,
        _access: &ClusterAccess,
        _namespace: &str,
        secret: &KubeSecret,
    ) -> ApiResult<()> {
        let mut state = self.enter("create_secret", &secret.name)?;
        if state.secrets.contains_key(&secret.name) {
            return Err(ApiError::conflict(format!("secret {} exists", secret.name)));
        }
        state.secrets.insert(secret.name.clone(), secret.clone());
        Ok(())
    }

    async fn create_deployment(
        &self,
        _access: &ClusterAccess,
        _namespace: &str,
        deployment: &Value,
    ) -> ApiResult<()> {
        let name = manifest_name(deployment);
        let mut state = self.enter("create_deployment", &name)?;
        if state.deployments.contains_key(&name) {
            return Err(ApiError::conflict(format!("deployment {name} exists")));
        }
        state.deployments.insert(name, deployment.clone());
        Ok(())
    }

    async fn patch_deployment(
        &self,
        _access: &ClusterAccess,
        _namespace: &str,
        name: &str,
        deployment: &Value,
    ) -> ApiResult<()> {
        let mut state = self.enter("patch_deployment", name)?;
        if !state.deployments.contains_key(name) {
            return Err(ApiError::not_found(format!("deployment {name}")));
        }
        state.deployment_patches.push(deployment.clone());
        state.deployments.insert(name.to_string(), deployment.clone());
        Ok(())
    }

    async fn create_service(
        &self,
        _access: &ClusterAccess,
        _namespace: &str,
        service: &Value,
    ) -> ApiResult<()> {
        let name = manifest_name(service);
        let mut state = self.enter("create_service", &name)?;
        if state.kube_services.contains_key(&name) {
            return Err(ApiError::conflict(format!("service {name} exists")));
        }
        state.kube_services.insert(name, service.clone());
        Ok(())
    }

    async fn ready_replicas(&self, _access: &ClusterAccess, label_selector: &str) -> ApiResult<u32> {
        let mut state = self.enter("ready_replicas", label_selector)?;
        state.replica_polls += 1;
        if state.replica_polls <= self.script.unready_replica_polls {
            return Ok(0);
        }
        let replicas = state
            .deployments
            .values()
            .map(|d| {
                d.pointer("/spec/replicas")
                    .and_then(Value::as_u64)
                    .unwrap_or(1)
            })
            .sum::<u64>();
        Ok(u32::try_from(replicas).unwrap_or(u32::MAX))
    }

    async fn ingress_addresses(
        &self,
        _access: &ClusterAccess,
        label_selector: &str,
    ) -> ApiResult<Vec<String>> {
        let mut state = self.enter("ingress_addresses", label_selector)?;
        state.ingress_polls += 1;
        if state.kube_services.is_empty() || state.ingress_polls <= self.script.missing_ingress_polls
        {
            return Ok(Vec::new());
        }
        Ok(vec![self.script.ingress_address.clone()])
    }
}

#[async_trait]
impl AppEngineApi for InMemoryCloud {
    async fn get_app(&self, project_id: &str) -> ApiResult<ManagedApp> {
        let state = self.enter("get_app", project_id)?;
        state
            .apps
            .get(project_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("no app in {project_id}")))
    }

    async fn create_app(&self, project_id: &str, location: &str) -> ApiResult<AppOperation> {
        let mut state = self.enter("create_app", project_id)?;
        if state.apps.contains_key(project_id) {
            return Err(ApiError::conflict(format!("{project_id} already has an app")));
        }
        state.apps.insert(
            project_id.to_string(),
            ManagedApp {
                id: project_id.to_string(),
                location: location.to_string(),
            },
        );
        let operation_id = format!("create-{project_id}");
        state
            .app_operations
            .insert(operation_id.clone(), self.script.app_operation_pending_polls);
        Ok(AppOperation {
            name: format!("apps/{project_id}/operations/{operation_id}"),
            done: false,
            error: None,
        })
    }

    async fn get_operation(&self, project_id: &str, operation_id: &str) -> ApiResult<AppOperation> {
        let mut state = self.enter("get_operation", operation_id)?;
        let remaining = state
            .app_operations
            .get_mut(operation_id)
            .ok_or_else(|| ApiError::not_found(format!("operation {operation_id}")))?;
        let done = *remaining == 0;
        *remaining = remaining.saturating_sub(1);
        Ok(AppOperation {
            name: format!("apps/{project_id}/operations/{operation_id}"),
            done,
            error: None,
        })
    }
}

#[async_trait]
impl AppDeployer for InMemoryCloud {
    async fn deploy(&self, project_id: &str, app_yaml: &Path) -> ApiResult<()> {
        let mut state = self.enter("deploy", project_id)?;
        if !state.apps.contains_key(project_id) {
            return Err(ApiError::not_found(format!("no app in {project_id}")));
        }
        state
            .app_deploys
            .push((project_id.to_string(), app_yaml.to_path_buf()));
        Ok(())
    }
}

/// Deployment and service manifests for a generated application.
fn workload_manifest(app_name: &str, image_tag: &str) -> String {
    format!(
        "apiVersion: apps/v1
kind: Deployment
metadata:
  name: {app_name}
  labels:
    app: {app_name}
spec:
  replicas: 1
  template:
    metadata:
      labels:
        app: {app_name}
    spec:
      containers:
        - name: {app_name}-app
          image: {image_tag}
---
apiVersion: v1
kind: Service
metadata:
  name: {app_name}
  labels:
    app: {app_name}
spec:
  type: LoadBalancer
  selector:
    app: {app_name}
  ports:
    - port: 80
      targetPort: 8080
"
    )
}

#[async_trait]
impl SourceGenerator for InMemoryCloud {
    async fn generate(&self, spec: &SourceSpec) -> ApiResult<PathBuf> {
        self.enter("generate_source", &spec.app_name)?
            .source_specs
            .push(spec.clone());

        let root = spec.project_dir.clone();
        let files = [
            (root.join("app.yaml"), "runtime: python37\n".to_string()),
            (
                root.join(format!("{}.yaml", spec.app_name)),
                workload_manifest(&spec.app_name, &spec.image_tag),
            ),
            (root.join("static/css/site.css"), "body {}\n".to_string()),
            (root.join("static/js/app.js"), "// app\n".to_string()),
        ];
        for (path, content) in files {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| io_error(&path, e))?;
        }
        Ok(root)
    }
}

#[async_trait]
impl DatabaseTooling for InMemoryCloud {
    async fn migrate(&self, target: &DatabaseTarget) -> ApiResult<()> {
        let mut state = self.enter("migrate", &target.instance)?;
        state.migrations += 1;
        Ok(())
    }

    async fn superuser_exists(&self, target: &DatabaseTarget, username: &str) -> ApiResult<bool> {
        let state = self.enter("superuser_exists", &target.instance)?;
        Ok(state.superusers.contains(username))
    }

    async fn create_superuser(
        &self,
        target: &DatabaseTarget,
        superuser: &Superuser,
    ) -> ApiResult<()> {
        let mut state = self.enter("create_superuser", &target.instance)?;
        if !state.superusers.insert(superuser.username.clone()) {
            return Err(ApiError::conflict(format!(
                "superuser {} exists",
                superuser.username
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StaticCollector for InMemoryCloud {
    async fn collect(&self, app_dir: &Path) -> ApiResult<()> {
        let mut state = self.enter("collect_static", &app_dir.display().to_string())?;
        state.static_collections += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_status_sticks() {
        let mut queue: VecDeque<String> = statuses(&["A", "B"]).into_iter().collect();
        assert_eq!(advance(&mut queue), "A");
        assert_eq!(advance(&mut queue), "B");
        assert_eq!(advance(&mut queue), "B");
    }

    #[tokio::test]
    async fn stale_policy_writes_conflict() {
        let cloud = InMemoryCloud::new();
        let first = cloud.get_project_policy("p").await.unwrap();
        let second = cloud.get_project_policy("p").await.unwrap();

        cloud.set_project_policy("p", &first).await.unwrap();
        let err = cloud.set_project_policy("p", &second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let cloud = InMemoryCloud::new();
        cloud.fail_times("get_project", 2, ApiError::unknown("flaky"));
        cloud.add_project("demo-123456", "Demo");

        assert!(cloud.get_project("demo-123456").await.is_err());
        assert!(cloud.get_project("demo-123456").await.is_err());
        assert!(cloud.get_project("demo-123456").await.is_ok());
        assert_eq!(cloud.call_count("get_project"), 3);
    }

    #[test]
    fn account_ids_follow_platform_rules() {
        assert!(valid_account_id("cloudsql-oauth-credentials"));
        assert!(!valid_account_id("short"));
        assert!(!valid_account_id("Upper-case-id"));
        assert!(!valid_account_id("trailing-dash-"));
    }
}
