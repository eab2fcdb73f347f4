//! # Provisioning Constants
//!
//! Enums and lookup tables shared by the provisioners, the deployment drivers
//! and the pipeline orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every kind of cloud resource the orchestrator touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Project,
    Billing,
    DatabaseInstance,
    Database,
    DatabaseUser,
    ApiService,
    ServiceAccount,
    RoleBinding,
    Bucket,
    StaticContent,
    Cluster,
    ContainerImage,
    Secret,
    Workload,
    ManagedApp,
    Deployment,
    SourceTree,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Billing => "billing",
            Self::DatabaseInstance => "database instance",
            Self::Database => "database",
            Self::DatabaseUser => "database user",
            Self::ApiService => "api service",
            Self::ServiceAccount => "service account",
            Self::RoleBinding => "role binding",
            Self::Bucket => "bucket",
            Self::StaticContent => "static content",
            Self::Cluster => "cluster",
            Self::ContainerImage => "container image",
            Self::Secret => "secret",
            Self::Workload => "workload",
            Self::ManagedApp => "managed app",
            Self::Deployment => "deployment",
            Self::SourceTree => "source tree",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller expects about a resource before the pipeline touches it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationMode {
    /// Create it; an existing resource is an error.
    Create,
    /// Reuse it when it exists, otherwise create it.
    #[default]
    CreateIfNeeded,
    /// It must already exist.
    MustExist,
}

impl fmt::Display for CreationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::CreateIfNeeded => "create_if_needed",
            Self::MustExist => "must_exist",
        };
        f.write_str(label)
    }
}

/// Target platform for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Container cluster running the app image as a workload.
    #[serde(rename = "gke")]
    Cluster,
    /// Managed application platform fed by a deploy command.
    #[serde(rename = "gae")]
    ManagedApp,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "gke",
            Self::ManagedApp => "gae",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gke" | "cluster" => Ok(Self::Cluster),
            "gae" | "managed_app" => Ok(Self::ManagedApp),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Which pipeline a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Create,
    Update,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
        }
    }
}

/// How a polled status string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Ready,
    Failed,
}

/// Pending and ready status sets for one kind of long-running resource.
/// Any status outside both sets is terminal and unexpected.
#[derive(Debug, Clone, Copy)]
pub struct StatusTable {
    pub resource: ResourceKind,
    pub pending: &'static [&'static str],
    pub ready: &'static [&'static str],
}

impl StatusTable {
    pub fn classify(&self, status: &str) -> StatusClass {
        if self.ready.contains(&status) {
            StatusClass::Ready
        } else if self.pending.contains(&status) {
            StatusClass::Pending
        } else {
            StatusClass::Failed
        }
    }
}

pub mod status_tables {
    use super::{ResourceKind, StatusTable};

    pub const DATABASE_INSTANCE: StatusTable = StatusTable {
        resource: ResourceKind::DatabaseInstance,
        pending: &["PENDING_CREATE"],
        ready: &["RUNNABLE"],
    };

    pub const DATABASE: StatusTable = StatusTable {
        resource: ResourceKind::Database,
        pending: &["PENDING"],
        ready: &["DONE", "RUNNING"],
    };

    pub const API_SERVICE: StatusTable = StatusTable {
        resource: ResourceKind::ApiService,
        pending: &["DISABLED"],
        ready: &["ENABLED"],
    };

    pub const CLUSTER: StatusTable = StatusTable {
        resource: ResourceKind::Cluster,
        pending: &["PROVISIONING"],
        ready: &["RUNNING"],
    };

    pub const MANAGED_APP_OPERATION: StatusTable = StatusTable {
        resource: ResourceKind::ManagedApp,
        pending: &["PENDING"],
        ready: &["DONE"],
    };
}

/// Keys the pipeline steps use to pass values along the shared context.
pub mod context_keys {
    pub const PROJECT_ID: &str = "project_id";
    pub const PROJECT_NAME: &str = "project_name";
    pub const APP_NAME: &str = "app_name";
    pub const APP_DIR: &str = "app_dir";
    pub const RESOURCE_NAMES: &str = "resource_names";
    pub const BILLING_ACCOUNT: &str = "billing_account";
    pub const APP_URL: &str = "app_url";
}

/// Role granted to everyone so bucket objects can be served publicly.
pub const PUBLIC_READ_MEMBER: &str = "allUsers";
pub const PUBLIC_READ_ROLE: &str = "roles/storage.objectViewer";

/// Object prefixes inside the app bucket.
pub const STATIC_PREFIX: &str = "static";
pub const SECRETS_PREFIX: &str = "secrets";

/// Secret group holding the database credentials.
pub const DATABASE_SECRET_GROUP: &str = "cloudsql";

/// Service account groups whose key secrets are mounted by the database
/// proxy container and by the application container.
pub const PROXY_ACCOUNT_GROUP: &str = "cloud_sql";
pub const APP_ACCOUNT_GROUP: &str = "django";

/// Header written at the top of the deployment record.
pub const RECORD_HEADER: &str = "# Generated file, do not edit";
pub const RECORD_FILE_NAME: &str = ".config.yaml";

/// Annotation bumped to make the cluster roll its pods.
pub const RESTART_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_classifies_unknown_as_failed() {
        let table = status_tables::CLUSTER;
        assert_eq!(table.classify("PROVISIONING"), StatusClass::Pending);
        assert_eq!(table.classify("RUNNING"), StatusClass::Ready);
        assert_eq!(table.classify("ERROR"), StatusClass::Failed);
        assert_eq!(table.classify(""), StatusClass::Failed);
    }

    #[test]
    fn database_accepts_done_and_running() {
        let table = status_tables::DATABASE;
        assert_eq!(table.classify("DONE"), StatusClass::Ready);
        assert_eq!(table.classify("RUNNING"), StatusClass::Ready);
        assert_eq!(table.classify("PENDING"), StatusClass::Pending);
    }

    #[test]
    fn backend_serializes_with_short_names() {
        assert_eq!(serde_json::to_string(&Backend::Cluster).unwrap(), "\"gke\"");
        assert_eq!(
            serde_json::from_str::<Backend>("\"gae\"").unwrap(),
            Backend::ManagedApp
        );
        assert_eq!("gke".parse::<Backend>().unwrap(), Backend::Cluster);
        assert!("heroku".parse::<Backend>().is_err());
    }

    #[test]
    fn creation_mode_defaults_to_reuse() {
        assert_eq!(CreationMode::default(), CreationMode::CreateIfNeeded);
    }
}
