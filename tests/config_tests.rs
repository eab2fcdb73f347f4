//! Loading deployment configuration from files.

use cloud_deploy_core::config::{ConfigManager, ConfigurationError, DeployConfig, RolloutStrategy};
use cloud_deploy_core::constants::{APP_ACCOUNT_GROUP, PROXY_ACCOUNT_GROUP};
use std::io::Write;

fn config_file(suffix: &str, body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_describe_a_complete_deployment() {
    let config = DeployConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.retry.policy_conflict_max_tries, 5);
    assert_eq!(config.retry.deploy_max_tries, 5);
    assert_eq!(config.rollout, RolloutStrategy::Native);
    assert_eq!(config.defaults.app_region, "us-west2");
    assert!(config
        .services
        .iter()
        .any(|s| s.name == "sqladmin.googleapis.com"));
    assert_eq!(
        config.secret_names(PROXY_ACCOUNT_GROUP),
        ["cloudsql-oauth-credentials"]
    );
    assert!(config.secret_names(APP_ACCOUNT_GROUP).is_empty());
}

#[test]
fn yaml_file_replaces_service_lists() {
    let file = config_file(
        ".yaml",
        "services:
  - title: Cloud SQL Admin API
    name: sqladmin.googleapis.com
service_accounts:
  proxy:
    - id: sql-proxy-account
      name: SQL Proxy
      file_name: proxy.json
      roles: [roles/cloudsql.client, roles/cloudsql.viewer]
retry:
  deploy_max_tries: 3
",
    );

    let config = ConfigManager::load_from_file(file.path())
        .unwrap()
        .into_config();

    assert_eq!(config.services.len(), 1);
    assert_eq!(config.retry.deploy_max_tries, 3);
    assert_eq!(config.retry.policy_conflict_max_tries, 5);
    let proxy = &config.service_accounts["proxy"];
    assert_eq!(proxy[0].id, "sql-proxy-account");
    assert_eq!(proxy[0].roles.len(), 2);
}

#[test]
fn toml_files_are_accepted() {
    let file = config_file(
        ".toml",
        "rollout = \"scale_to_zero\"\n\n[defaults]\nzone = \"europe-west1-b\"\n",
    );

    let config = ConfigManager::load_from_file(file.path())
        .unwrap()
        .into_config();
    assert_eq!(config.rollout, RolloutStrategy::ScaleToZero);
    assert_eq!(config.defaults.zone, "europe-west1-b");
    assert_eq!(config.defaults.region, "us-west1");
}

#[test]
fn zero_budgets_are_rejected() {
    let mut config = DeployConfig::default();
    config.polling.reachability_max_polls = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "polling.reachability_max_polls"
    ));

    let mut config = DeployConfig::default();
    config.retry.deploy_max_tries = 0;
    assert!(ConfigManager::from_config(config).is_err());
}

#[test]
fn service_accounts_need_an_id_and_file_name() {
    let file = config_file(
        ".yaml",
        "service_accounts:\n  broken:\n    - id: \"\"\n      name: Broken\n      file_name: key.json\n      roles: []\n",
    );

    let err = ConfigManager::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingRequiredField { .. }));
}

#[test]
fn unreadable_yaml_is_a_load_error() {
    let file = config_file(".yaml", "polling: [not, a, map]\n");

    let err = ConfigManager::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigurationError::LoadError { .. }));
}
