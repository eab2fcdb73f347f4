//! Storage buckets and the static content served from them.

use crate::clients::{StaticCollector, StorageApi};
use crate::constants::{
    ResourceKind, PUBLIC_READ_MEMBER, PUBLIC_READ_ROLE, SECRETS_PREFIX, STATIC_PREFIX,
};
use crate::error::{ErrorCategory, ProvisionError, ProvisionResult};
use crate::logging::log_resource_operation;
use crate::policy::PolicyDocument;
use crate::resilience::RetryPolicy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Every regular file under `root`, sorted, with its object-style relative
/// path (`/` separated).
pub async fn collect_files(root: &Path) -> ProvisionResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ProvisionError::io(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProvisionError::io(&dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ProvisionError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(path.as_path())
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((relative, path));
            }
        }
    }

    files.sort();
    Ok(files)
}

#[derive(Clone)]
pub struct StorageProvisioner {
    storage: Arc<dyn StorageApi>,
    collector: Arc<dyn StaticCollector>,
    retry: RetryPolicy,
}

impl StorageProvisioner {
    pub fn new(
        storage: Arc<dyn StorageApi>,
        collector: Arc<dyn StaticCollector>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            collector,
            retry,
        }
    }

    /// Create the bucket. A conflict is fine when the bucket is one of this
    /// project's own; otherwise the global name is taken by someone else.
    pub async fn ensure_bucket(&self, project_id: &str, bucket: &str) -> ProvisionResult<()> {
        match self.storage.insert_bucket(project_id, bucket).await {
            Ok(created) if created.name.is_empty() => Err(ProvisionError::unexpected_response(
                ResourceKind::Bucket,
                format!("creating {bucket} returned no bucket name"),
            )),
            Ok(_) => {
                log_resource_operation("create", "bucket", bucket, Some(project_id), "created");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                let owned = self
                    .storage
                    .list_buckets(project_id)
                    .await
                    .map_err(|e| ProvisionError::from_api(ResourceKind::Bucket, bucket, e))?
                    .iter()
                    .any(|b| b.name == bucket);
                if owned {
                    info!(
                        project_id = %project_id,
                        bucket = %bucket,
                        category = %ErrorCategory::ReusableConflict,
                        "🪣 Reusing existing bucket"
                    );
                    Ok(())
                } else {
                    Err(ProvisionError::NameTaken {
                        resource: ResourceKind::Bucket,
                        name: bucket.to_string(),
                        project_id: project_id.to_string(),
                    })
                }
            }
            Err(source) => Err(ProvisionError::from_api(ResourceKind::Bucket, bucket, source)),
        }
    }

    /// Let anyone read the bucket's objects.
    pub async fn make_public(&self, bucket: &str) -> ProvisionResult<()> {
        let storage = self.storage.as_ref();
        self.retry
            .read_modify_write(
                "bucket_policy",
                move || storage.get_bucket_policy(bucket),
                |mut policy: PolicyDocument| {
                    policy.add_member(PUBLIC_READ_ROLE, PUBLIC_READ_MEMBER);
                    policy
                },
                move |policy| async move { storage.set_bucket_policy(bucket, &policy).await },
            )
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    ProvisionError::RetriesExhausted {
                        resource: ResourceKind::Bucket,
                        attempts: self.retry.max_tries,
                        source: e,
                    }
                } else {
                    ProvisionError::from_api(ResourceKind::Bucket, bucket, e)
                }
            })?;
        info!(bucket = %bucket, "🌍 Bucket is publicly readable");
        Ok(())
    }

    /// Upload everything under `dir` as `<prefix>/<relative path>`.
    pub async fn upload_dir(
        &self,
        bucket: &str,
        dir: &Path,
        prefix: &str,
    ) -> ProvisionResult<usize> {
        let files = collect_files(dir).await?;
        for (relative, path) in &files {
            let object = format!("{prefix}/{relative}");
            self.storage
                .upload_object(bucket, &object, path)
                .await
                .map_err(|e| ProvisionError::from_api(ResourceKind::StaticContent, &object, e))?;
            debug!(bucket = %bucket, object = %object, "⬆️ Uploaded");
        }
        info!(bucket = %bucket, prefix = %prefix, files = files.len(), "⬆️ Upload complete");
        Ok(files.len())
    }

    async fn collect(&self, app_dir: &Path) -> ProvisionResult<()> {
        self.collector.collect(app_dir).await.map_err(|e| {
            ProvisionError::from_api(ResourceKind::StaticContent, app_dir.display().to_string(), e)
        })
    }

    /// First-time static content setup: collect, create the bucket, open it
    /// for reading, upload.
    pub async fn serve_static(
        &self,
        project_id: &str,
        bucket: &str,
        app_dir: &Path,
        static_dir: &Path,
    ) -> ProvisionResult<usize> {
        self.collect(app_dir).await?;
        self.ensure_bucket(project_id, bucket).await?;
        self.make_public(bucket).await?;
        self.upload_dir(bucket, static_dir, STATIC_PREFIX).await
    }

    /// Re-collect and re-upload into a bucket that already serves content.
    pub async fn update_static(
        &self,
        bucket: &str,
        app_dir: &Path,
        static_dir: &Path,
    ) -> ProvisionResult<usize> {
        self.collect(app_dir).await?;
        self.upload_dir(bucket, static_dir, STATIC_PREFIX).await
    }

    /// Private bucket holding secret files for platforms without a secret
    /// store.
    pub async fn serve_secrets(
        &self,
        project_id: &str,
        bucket: &str,
        secrets_dir: &Path,
    ) -> ProvisionResult<usize> {
        self.ensure_bucket(project_id, bucket).await?;
        self.upload_dir(bucket, secrets_dir, SECRETS_PREFIX).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_nested_files_with_posix_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css/vendor")).unwrap();
        std::fs::write(dir.path().join("app.js"), "x").unwrap();
        std::fs::write(dir.path().join("css/site.css"), "x").unwrap();
        std::fs::write(dir.path().join("css/vendor/lib.css"), "x").unwrap();

        let files = collect_files(dir.path()).await.unwrap();
        let names: Vec<_> = files.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["app.js", "css/site.css", "css/vendor/lib.css"]);
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let err = collect_files(Path::new("/no/such/static")).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Io { .. }));
    }
}
