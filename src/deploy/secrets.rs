//! Secrets payload assembled during the create pipeline and materialized by
//! the deployment drivers.

use crate::clients::KubeSecret;
use crate::constants::DATABASE_SECRET_GROUP;
use crate::error::{ProvisionError, ProvisionResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Secret group name to (file name to content).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsPayload {
    groups: BTreeMap<String, BTreeMap<String, String>>,
}

impl SecretsPayload {
    /// Payload seeded with the database credentials group.
    pub fn with_database_credentials(username: &str, password: &str) -> Self {
        let mut payload = Self::default();
        payload.insert(DATABASE_SECRET_GROUP, "username", username);
        payload.insert(DATABASE_SECRET_GROUP, "password", password);
        payload
    }

    pub fn insert(&mut self, group: &str, file_name: &str, content: &str) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(file_name.to_string(), content.to_string());
    }

    pub fn group(&self, group: &str) -> Option<&BTreeMap<String, String>> {
        self.groups.get(group)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// One Kubernetes secret per group, values base64 encoded.
    pub fn to_kube_secrets(&self) -> Vec<KubeSecret> {
        self.groups
            .iter()
            .map(|(name, files)| KubeSecret {
                name: name.clone(),
                data: files
                    .iter()
                    .map(|(key, value)| (key.clone(), STANDARD.encode(value.as_bytes())))
                    .collect(),
            })
            .collect()
    }

    /// Write the database credentials group as `<dir>/cloudsql.json`.
    pub async fn write_database_file(&self, dir: &Path) -> ProvisionResult<PathBuf> {
        let credentials = self.group(DATABASE_SECRET_GROUP).cloned().unwrap_or_default();
        let body = serde_json::to_vec(&credentials).map_err(|e| {
            ProvisionError::io(dir, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        let path = dir.join(format!("{DATABASE_SECRET_GROUP}.json"));
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| ProvisionError::io(&path, e))?;
        Ok(path)
    }
}

impl fmt::Debug for SecretsPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (group, files) in &self.groups {
            map.entry(group, &files.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_group_is_always_present() {
        let payload = SecretsPayload::with_database_credentials("postgres", "s3cret");
        let group = payload.group("cloudsql").unwrap();
        assert_eq!(group["username"], "postgres");
        assert_eq!(group["password"], "s3cret");
    }

    #[test]
    fn kube_secrets_are_base64_encoded() {
        let mut payload = SecretsPayload::with_database_credentials("postgres", "pw");
        payload.insert("proxy", "credentials.json", "{\"k\":1}");

        let secrets = payload.to_kube_secrets();
        assert_eq!(secrets.len(), 2);
        let proxy = secrets.iter().find(|s| s.name == "proxy").unwrap();
        assert_eq!(
            STANDARD.decode(&proxy.data["credentials.json"]).unwrap(),
            b"{\"k\":1}"
        );
    }

    #[test]
    fn debug_shows_keys_not_values() {
        let payload = SecretsPayload::with_database_credentials("postgres", "topsecret");
        let rendered = format!("{payload:?}");
        assert!(rendered.contains("password"));
        assert!(!rendered.contains("topsecret"));
    }

    #[tokio::test]
    async fn database_file_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let payload = SecretsPayload::with_database_credentials("postgres", "pw");
        let path = payload.write_database_file(dir.path()).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "cloudsql.json");
        let parsed: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed["password"], "pw");
    }
}
