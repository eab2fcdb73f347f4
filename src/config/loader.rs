//! Configuration Loader
//!
//! Layers the built-in defaults, an optional configuration file and
//! `CLOUD_DEPLOY__SECTION__KEY` environment variables, then validates the
//! result.

use super::error::{ConfigResult, ConfigurationError};
use super::DeployConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ENV_PREFIX: &str = "CLOUD_DEPLOY";
const ENV_SEPARATOR: &str = "__";

/// Environment variable naming a configuration file.
pub const CONFIG_PATH_ENV: &str = "CLOUD_DEPLOY_CONFIG";

/// Loaded and validated configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: DeployConfig,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from the file named by `CLOUD_DEPLOY_CONFIG`, or
    /// from defaults and the environment alone when it is unset.
    pub fn from_env() -> ConfigResult<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::load_from_file(path),
            _ => Self::load_layers(None),
        }
    }

    /// Load configuration from a YAML, TOML or JSON file, chosen by extension.
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigurationError::config_file_not_found(path));
        }
        Self::load_layers(Some(path))
    }

    /// Wrap an already built configuration, validating it first.
    pub fn from_config(config: DeployConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source_path: None,
        })
    }

    fn load_layers(path: Option<&Path>) -> ConfigResult<Self> {
        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());

        let defaults = config::Config::try_from(&DeployConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading deployment configuration file");
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: DeployConfig = builder
            .build()
            .and_then(|layered| layered.try_deserialize())
            .map_err(|e| ConfigurationError::load_error(&source_name, e))?;

        config.validate()?;

        info!(
            source = %source_name,
            services = config.services.len(),
            service_account_groups = config.service_accounts.len(),
            rollout = ?config.rollout,
            "⚙️ Deployment configuration loaded"
        );

        Ok(Self {
            config,
            source_path: path.map(Path::to_path_buf),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn into_config(self) -> DeployConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RolloutStrategy;
    use std::io::Write;

    #[test]
    fn partial_yaml_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "polling:\n  reachability_max_polls: 10\nrollout: scale_to_zero\ndefaults:\n  region: europe-west1\n"
        )
        .unwrap();

        let manager = ConfigManager::load_from_file(file.path()).unwrap();
        let config = manager.config();
        assert_eq!(config.polling.reachability_max_polls, 10);
        assert_eq!(config.polling.cloud_interval_ms, 2_000);
        assert_eq!(config.rollout, RolloutStrategy::ScaleToZero);
        assert_eq!(config.defaults.region, "europe-west1");
        assert_eq!(config.defaults.zone, "us-west1-a");
        assert!(!config.services.is_empty());
        assert_eq!(manager.source_path(), Some(file.path()));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "retry:\n  policy_conflict_max_tries: 0\n").unwrap();

        let err = ConfigManager::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ConfigManager::load_from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn from_config_validates() {
        let mut config = DeployConfig::default();
        config.services.clear();
        assert!(ConfigManager::from_config(config).is_err());
    }
}
