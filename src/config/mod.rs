//! # Deployment Configuration
//!
//! Tunables for the provisioning pipeline: poll intervals and budgets, retry
//! budgets, resource defaults, the cloud services to enable and the service
//! accounts to create.
//!
//! ## Architecture
//!
//! - **Layered loading**: built-in defaults, then an optional file, then
//!   `CLOUD_DEPLOY__*` environment variables (see [`ConfigManager`]).
//! - **Explicit validation**: [`DeployConfig::validate`] rejects zero budgets
//!   and empty lists before any remote call is made.
//! - **No secrets**: passwords travel in request types, never in here.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cloud_deploy_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::from_env()?;
//! let interval = manager.config().polling.cloud_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::PROXY_ACCOUNT_GROUP;
use crate::resilience::{BackoffConfig, PollPolicy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Poll intervals and budgets
    pub polling: PollingConfig,

    /// Retry budgets and backoff
    pub retry: RetryConfig,

    /// Region, zone and database defaults
    pub defaults: DefaultsConfig,

    /// Cloud APIs enabled on every project
    pub services: Vec<ServiceSpec>,

    /// Service accounts to create, grouped by the container that mounts
    /// their keys (`cloud_sql` for the database proxy, `django` for the app)
    pub service_accounts: BTreeMap<String, Vec<ServiceAccountSpec>>,

    /// How the cluster backend rolls pods on update
    pub rollout: RolloutStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between control-plane status checks
    pub cloud_interval_ms: u64,
    /// Interval between workload reachability checks
    pub reachability_interval_ms: u64,
    /// Budget for each reachability wait
    pub reachability_max_polls: u32,
    /// Interval between checks that a new project is visible
    pub project_confirm_interval_ms: u64,
    pub project_confirm_max_polls: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            cloud_interval_ms: 2_000,
            reachability_interval_ms: 500,
            reachability_max_polls: 1_200,
            project_confirm_interval_ms: 3_000,
            project_confirm_max_polls: 20,
        }
    }
}

impl PollingConfig {
    pub fn cloud_interval(&self) -> Duration {
        Duration::from_millis(self.cloud_interval_ms)
    }

    pub fn cloud_policy(&self) -> PollPolicy {
        PollPolicy::new(self.cloud_interval())
    }

    pub fn reachability_policy(&self) -> PollPolicy {
        PollPolicy::bounded(
            Duration::from_millis(self.reachability_interval_ms),
            self.reachability_max_polls,
        )
    }

    pub fn project_confirm_policy(&self) -> PollPolicy {
        PollPolicy::bounded(
            Duration::from_millis(self.project_confirm_interval_ms),
            self.project_confirm_max_polls,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts for conflicting policy writes
    pub policy_conflict_max_tries: u32,
    /// Attempts for the managed-app deploy command
    pub deploy_max_tries: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy_conflict_max_tries: 5,
            deploy_max_tries: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn policy_conflict_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.policy_conflict_max_tries, self.backoff.clone())
    }

    pub fn deploy_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.deploy_max_tries, self.backoff.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Region for the database instance and cluster
    pub region: String,
    /// Zone for the cluster
    pub zone: String,
    /// Region for the managed application
    pub app_region: String,
    pub database_user: String,
    pub database_version: String,
    pub database_cpus: u32,
    pub database_memory_mb: u32,
    /// Kubernetes namespace for secrets, deployments and services
    pub namespace: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            region: "us-west1".to_string(),
            zone: "us-west1-a".to_string(),
            app_region: "us-west2".to_string(),
            database_user: "postgres".to_string(),
            database_version: "POSTGRES_9_6".to_string(),
            database_cpus: 1,
            database_memory_mb: 3_840,
            namespace: "default".to_string(),
        }
    }
}

/// A cloud API to enable on the project
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceSpec {
    pub title: String,
    pub name: String,
}

impl ServiceSpec {
    pub fn new(title: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            name: name.into(),
        }
    }
}

/// A service account whose key is shipped to the application as a secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceAccountSpec {
    /// Account id, the part before `@`
    pub id: String,
    /// Display name
    pub name: String,
    /// File name the key is stored under inside its secret group
    pub file_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    /// Bump a pod-template annotation and let the cluster roll the pods
    #[default]
    Native,
    /// Scale the workload to zero replicas, then back to its original count
    ScaleToZero,
}

fn default_services() -> Vec<ServiceSpec> {
    [
        ("Service Usage API", "serviceusage.googleapis.com"),
        ("Cloud SQL API", "sql-component.googleapis.com"),
        ("Cloud SQL Admin API", "sqladmin.googleapis.com"),
        ("Cloud Storage API", "storage-component.googleapis.com"),
        ("Kubernetes Engine API", "container.googleapis.com"),
        ("Container Registry API", "containerregistry.googleapis.com"),
        ("Cloud Build API", "cloudbuild.googleapis.com"),
        ("App Engine Admin API", "appengine.googleapis.com"),
    ]
    .into_iter()
    .map(|(title, name)| ServiceSpec::new(title, name))
    .collect()
}

fn default_service_accounts() -> BTreeMap<String, Vec<ServiceAccountSpec>> {
    let mut accounts = BTreeMap::new();
    accounts.insert(
        PROXY_ACCOUNT_GROUP.to_string(),
        vec![ServiceAccountSpec {
            id: "cloudsql-oauth-credentials".to_string(),
            name: "Cloud SQL Proxy Credentials".to_string(),
            file_name: "credentials.json".to_string(),
            roles: vec!["roles/cloudsql.client".to_string()],
        }],
    );
    accounts
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            polling: PollingConfig::default(),
            retry: RetryConfig::default(),
            defaults: DefaultsConfig::default(),
            services: default_services(),
            service_accounts: default_service_accounts(),
            rollout: RolloutStrategy::default(),
        }
    }
}

impl DeployConfig {
    /// Ids of the accounts in `group`; each id names one key secret.
    pub fn secret_names(&self, group: &str) -> Vec<String> {
        self.service_accounts
            .get(group)
            .map(|accounts| accounts.iter().map(|a| a.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.polling.cloud_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "polling.cloud_interval_ms",
                "0",
                "poll interval must be greater than 0",
            ));
        }

        if self.polling.reachability_max_polls == 0 {
            return Err(ConfigurationError::invalid_value(
                "polling.reachability_max_polls",
                "0",
                "reachability waits need at least one poll",
            ));
        }

        if self.polling.project_confirm_max_polls == 0 {
            return Err(ConfigurationError::invalid_value(
                "polling.project_confirm_max_polls",
                "0",
                "project confirmation needs at least one poll",
            ));
        }

        if self.retry.policy_conflict_max_tries == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.policy_conflict_max_tries",
                "0",
                "at least one attempt is required",
            ));
        }

        if self.retry.deploy_max_tries == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.deploy_max_tries",
                "0",
                "at least one attempt is required",
            ));
        }

        if self.retry.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.backoff.multiplier",
                self.retry.backoff.multiplier.to_string(),
                "backoff must not shrink between attempts",
            ));
        }

        if self.services.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "services",
                "deployment configuration",
            ));
        }

        for (field, value) in [
            ("defaults.region", &self.defaults.region),
            ("defaults.zone", &self.defaults.zone),
            ("defaults.app_region", &self.defaults.app_region),
            ("defaults.database_user", &self.defaults.database_user),
            ("defaults.namespace", &self.defaults.namespace),
        ] {
            if value.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "resource defaults",
                ));
            }
        }

        for (group, accounts) in &self.service_accounts {
            for account in accounts {
                if account.id.is_empty() || account.file_name.is_empty() {
                    return Err(ConfigurationError::missing_required_field(
                        format!("service_accounts.{group}.id/file_name"),
                        "service account configuration",
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DeployConfig::default();
        config.validate().unwrap();
        assert_eq!(config.polling.cloud_interval(), Duration::from_secs(2));
        assert_eq!(config.retry.policy_conflict_max_tries, 5);
        assert_eq!(config.defaults.region, "us-west1");
        assert_eq!(config.rollout, RolloutStrategy::Native);
        assert!(config
            .services
            .iter()
            .any(|s| s.name == "sqladmin.googleapis.com"));
    }

    #[test]
    fn empty_services_are_rejected() {
        let config = DeployConfig {
            services: Vec::new(),
            ..DeployConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn zero_budgets_are_rejected() {
        let mut config = DeployConfig::default();
        config.retry.deploy_max_tries = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "retry.deploy_max_tries"
        ));
    }

    #[test]
    fn reachability_policy_is_bounded() {
        let polling = PollingConfig::default();
        let policy = polling.reachability_policy();
        assert_eq!(policy.interval, Duration::from_millis(500));
        assert_eq!(policy.max_polls, Some(1_200));
        assert_eq!(polling.cloud_policy().max_polls, None);
    }
}
