//! The deployment record persisted next to the application source.

use crate::constants::{Backend, RECORD_FILE_NAME, RECORD_HEADER};
use crate::error::{ProvisionError, ProvisionResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// What an update run needs to know about an earlier create run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub project_id: String,
    pub django_project_name: String,
    pub backend: Backend,
}

impl DeploymentRecord {
    fn validate(&self, path: &Path) -> ProvisionResult<()> {
        for (field, value) in [
            ("project_id", &self.project_id),
            ("django_project_name", &self.django_project_name),
        ] {
            if value.trim().is_empty() {
                return Err(invalid_record(path, format!("{field} is empty")));
            }
        }
        Ok(())
    }
}

fn invalid_record(path: &Path, message: impl Into<String>) -> ProvisionError {
    ProvisionError::InvalidRecord {
        path: path.display().to_string(),
        message: message.into(),
    }
}

/// Storage for deployment records, keyed by application directory.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, app_dir: &Path) -> ProvisionResult<DeploymentRecord>;
    async fn save(&self, app_dir: &Path, record: &DeploymentRecord) -> ProvisionResult<()>;
}

/// YAML file at `<app_dir>/.config.yaml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileRecordStore;

impl FileRecordStore {
    pub fn path_for(app_dir: &Path) -> PathBuf {
        app_dir.join(RECORD_FILE_NAME)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn load(&self, app_dir: &Path) -> ProvisionResult<DeploymentRecord> {
        let path = Self::path_for(app_dir);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(invalid_record(
                    &path,
                    "no deployment record found; was the application created with this tool?",
                ))
            }
            Err(e) => return Err(ProvisionError::io(&path, e)),
        };

        let record: DeploymentRecord =
            serde_yaml::from_str(&text).map_err(|e| invalid_record(&path, e.to_string()))?;
        record.validate(&path)?;
        Ok(record)
    }

    async fn save(&self, app_dir: &Path, record: &DeploymentRecord) -> ProvisionResult<()> {
        let path = Self::path_for(app_dir);
        let body =
            serde_yaml::to_string(record).map_err(|e| invalid_record(&path, e.to_string()))?;
        tokio::fs::write(&path, format!("{RECORD_HEADER}\n{body}"))
            .await
            .map_err(|e| ProvisionError::io(&path, e))?;
        info!(path = %path.display(), project_id = %record.project_id, "📝 Deployment record saved");
        Ok(())
    }
}
