//! Payloads exchanged with the control-plane clients.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInfo {
    pub project_id: String,
    pub billing_account_name: Option<String>,
    /// Absent when the API answered without the field.
    pub billing_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAccount {
    /// `billingAccounts/XXXXXX-XXXXXX-XXXXXX`
    pub name: String,
    pub display_name: String,
    pub open: bool,
}

/// Database instance definition sent on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDefinition {
    pub name: String,
    pub region: String,
    pub database_version: String,
    /// `db-custom-<cpus>-<memory>`
    pub tier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlInstance {
    pub name: String,
    pub state: String,
}

/// Status-bearing response of a database or user mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlOperation {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    /// `projects/<project>/serviceAccounts/<email>`
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    /// Base64 encoded key file
    pub private_key_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub project_id: String,
}

/// Cluster definition sent on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDefinition {
    pub name: String,
    pub location: String,
    pub initial_cluster_version: String,
    pub initial_node_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub status: String,
    pub endpoint: Option<String>,
    /// Base64 encoded cluster CA certificate
    pub cluster_ca_certificate: Option<String>,
}

/// What a Kubernetes client needs to reach a cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterAccess {
    pub endpoint: String,
    /// PEM bytes of the cluster CA
    pub ca_certificate: Vec<u8>,
}

impl fmt::Debug for ClusterAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterAccess")
            .field("endpoint", &self.endpoint)
            .field("ca_certificate", &format!("<{} bytes>", self.ca_certificate.len()))
            .finish()
    }
}

/// An opaque Kubernetes secret, values base64 encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeSecret {
    pub name: String,
    pub data: BTreeMap<String, String>,
}

impl fmt::Debug for KubeSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeSecret")
            .field("name", &self.name)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedApp {
    pub id: String,
    pub location: String,
}

/// A long-running managed-app operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppOperation {
    /// `apps/<project>/operations/<id>`
    pub name: String,
    pub done: bool,
    pub error: Option<String>,
}

impl AppOperation {
    pub fn operation_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Status string in the vocabulary of the managed-app status table.
    pub fn status(&self) -> String {
        match (&self.error, self.done) {
            (Some(message), _) => format!("ERROR: {message}"),
            (None, true) => "DONE".to_string(),
            (None, false) => "PENDING".to_string(),
        }
    }
}

/// Identifiers handed to the external source generator.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub project_id: String,
    pub app_name: String,
    pub project_dir: PathBuf,
    pub database_user: String,
    pub database_password: String,
    pub database_instance: String,
    pub database_name: String,
    pub region: String,
    pub static_bucket: String,
    pub image_tag: String,
    pub cloudsql_secrets: Vec<String>,
    pub app_secrets: Vec<String>,
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSpec")
            .field("project_id", &self.project_id)
            .field("app_name", &self.app_name)
            .field("project_dir", &self.project_dir)
            .field("database_user", &self.database_user)
            .field("database_password", &"<redacted>")
            .field("database_instance", &self.database_instance)
            .field("database_name", &self.database_name)
            .field("static_bucket", &self.static_bucket)
            .field("image_tag", &self.image_tag)
            .finish_non_exhaustive()
    }
}

/// Where the database tooling connects to.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub app_dir: PathBuf,
    pub project_id: String,
    pub instance: String,
    pub region: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseTarget")
            .field("app_dir", &self.app_dir)
            .field("project_id", &self.project_id)
            .field("instance", &self.instance)
            .field("region", &self.region)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Administrator account created inside the application database.
#[derive(Clone, PartialEq, Eq)]
pub struct Superuser {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Superuser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Superuser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_status_prefers_error() {
        let op = AppOperation {
            name: "apps/p/operations/42".into(),
            done: true,
            error: Some("quota".into()),
        };
        assert_eq!(op.status(), "ERROR: quota");
        assert_eq!(op.operation_id(), "42");

        let pending = AppOperation {
            error: None,
            done: false,
            ..op
        };
        assert_eq!(pending.status(), "PENDING");
    }

    #[test]
    fn debug_output_hides_passwords() {
        let user = Superuser {
            username: "admin".into(),
            email: "a@example.com".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{user:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
