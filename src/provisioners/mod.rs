//! # Resource Provisioners
//!
//! One provisioner per resource kind, each built on the [`PollPolicy`] and
//! [`RetryPolicy`] primitives and each safe to call again after a partial
//! run.
//!
//! ## Reuse rules
//!
//! | Resource | On "already exists" |
//! |---|---|
//! | Project | depends on [`CreationMode`](crate::constants::CreationMode) |
//! | Database instance / database | reused |
//! | Service account | reused, roles merged again |
//! | Bucket | reused when listed under the same project, otherwise fatal |
//! | Cluster | reused |
//! | Managed app | reused |

pub mod billing;
pub mod cluster;
pub mod database;
pub mod managed_app;
pub mod project;
pub mod service_account;
pub mod services;
pub mod storage;

pub use billing::BillingProvisioner;
pub use cluster::{ClusterProvisioner, ClusterSpec};
pub use database::{DatabaseProvisioner, InstanceSpec};
pub use managed_app::ManagedAppProvisioner;
pub use project::{ProjectProvisioner, ProjectSpec};
pub use service_account::ServiceAccountProvisioner;
pub use services::ServiceEnabler;
pub use storage::StorageProvisioner;

use crate::clients::CloudClients;
use crate::config::DeployConfig;
use crate::constants::ResourceKind;
use crate::error::{ApiError, ProvisionError};
use crate::resilience::{PollError, PollPolicy, RetryPolicy};

/// Map a poll failure onto the provisioning error for `name`.
pub(crate) fn poll_failure(
    resource: ResourceKind,
    name: &str,
    error: PollError<ApiError>,
) -> ProvisionError {
    match error {
        PollError::Check(source) => ProvisionError::from_api(resource, name, source),
        PollError::UnexpectedStatus { status } => ProvisionError::UnexpectedStatus {
            resource,
            name: name.to_string(),
            status,
        },
        PollError::Exhausted { polls } => ProvisionError::NotReady {
            resource,
            name: name.to_string(),
            polls,
        },
    }
}

/// Every provisioner, wired to one set of clients and one configuration.
#[derive(Clone)]
pub struct Provisioners {
    pub project: ProjectProvisioner,
    pub billing: BillingProvisioner,
    pub database: DatabaseProvisioner,
    pub services: ServiceEnabler,
    pub service_accounts: ServiceAccountProvisioner,
    pub storage: StorageProvisioner,
    pub cluster: ClusterProvisioner,
    pub managed_app: ManagedAppProvisioner,
}

impl Provisioners {
    pub fn new(clients: &CloudClients, config: &DeployConfig) -> Self {
        let cloud_poll: PollPolicy = config.polling.cloud_policy();
        let policy_retry: RetryPolicy = config.retry.policy_conflict_policy();

        Self {
            project: ProjectProvisioner::new(
                clients.projects.clone(),
                config.polling.project_confirm_policy(),
            ),
            billing: BillingProvisioner::new(clients.billing.clone()),
            database: DatabaseProvisioner::new(
                clients.sql.clone(),
                clients.database_tooling.clone(),
                cloud_poll,
            ),
            services: ServiceEnabler::new(clients.services.clone(), cloud_poll),
            service_accounts: ServiceAccountProvisioner::new(
                clients.iam.clone(),
                policy_retry.clone(),
            ),
            storage: StorageProvisioner::new(
                clients.storage.clone(),
                clients.static_collector.clone(),
                policy_retry,
            ),
            cluster: ClusterProvisioner::new(clients.container.clone(), cloud_poll),
            managed_app: ManagedAppProvisioner::new(clients.app_engine.clone(), cloud_poll),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_failures_map_to_provision_errors() {
        let err = poll_failure(
            ResourceKind::Cluster,
            "c",
            PollError::UnexpectedStatus {
                status: "ERROR".into(),
            },
        );
        assert!(
            matches!(err, ProvisionError::UnexpectedStatus { ref status, .. } if status == "ERROR")
        );

        let err = poll_failure(ResourceKind::Workload, "w", PollError::Exhausted { polls: 7 });
        assert!(matches!(err, ProvisionError::NotReady { polls: 7, .. }));

        let err = poll_failure(
            ResourceKind::Database,
            "db",
            PollError::Check(ApiError::permission_denied("no")),
        );
        assert!(matches!(err, ProvisionError::PermissionDenied { .. }));
    }
}
