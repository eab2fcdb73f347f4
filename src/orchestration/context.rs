//! Values threaded from one pipeline step to the next.

use crate::constants::context_keys;
use crate::deploy::SecretsPayload;
use crate::error::{ProvisionError, ProvisionResult};
use crate::naming::ResourceNames;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Outputs of completed steps, keyed by [`context_keys`].
///
/// Secrets travel beside the map so they never end up in a serialized
/// snapshot of the context.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    values: BTreeMap<String, Value>,
    secrets: Option<SecretsPayload>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Store any serializable value. Values that fail to serialize are
    /// stored as `null`.
    pub fn set_serialized<T: Serialize>(&mut self, key: &str, value: &T) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// String value a step cannot run without.
    pub fn require_str(&self, step: &str, key: &str) -> ProvisionResult<&str> {
        self.get_str(key).ok_or_else(|| missing(step, key))
    }

    pub fn require<T: DeserializeOwned>(&self, step: &str, key: &str) -> ProvisionResult<T> {
        self.values
            .get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .ok_or_else(|| missing(step, key))
    }

    pub fn project_id(&self, step: &str) -> ProvisionResult<&str> {
        self.require_str(step, context_keys::PROJECT_ID)
    }

    pub fn app_dir(&self, step: &str) -> ProvisionResult<PathBuf> {
        self.require_str(step, context_keys::APP_DIR)
            .map(PathBuf::from)
    }

    pub fn resource_names(&self, step: &str) -> ProvisionResult<ResourceNames> {
        self.require(step, context_keys::RESOURCE_NAMES)
    }

    pub fn secrets(&self) -> Option<&SecretsPayload> {
        self.secrets.as_ref()
    }

    pub fn require_secrets(&self, step: &str) -> ProvisionResult<&SecretsPayload> {
        self.secrets.as_ref().ok_or_else(|| missing(step, "secrets"))
    }

    pub fn secrets_mut(&mut self, step: &str) -> ProvisionResult<&mut SecretsPayload> {
        self.secrets.as_mut().ok_or_else(|| missing(step, "secrets"))
    }

    pub fn set_secrets(&mut self, secrets: SecretsPayload) {
        self.secrets = Some(secrets);
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

fn missing(step: &str, key: &str) -> ProvisionError {
    ProvisionError::MissingContext {
        step: step.to_string(),
        key: key.to_string(),
    }
}
