//! Workload manifests and app descriptors read from the generated source tree.

use crate::constants::{ResourceKind, RESTART_ANNOTATION};
use crate::error::{ProvisionError, ProvisionResult};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// The `Deployment` and `Service` documents of `<app_dir>/<app_name>.yaml`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadManifest {
    pub path: PathBuf,
    pub deployment: Value,
    pub service: Option<Value>,
}

impl WorkloadManifest {
    pub fn path_for(app_dir: &Path, app_name: &str) -> PathBuf {
        app_dir.join(format!("{app_name}.yaml"))
    }

    pub async fn load(app_dir: &Path, app_name: &str) -> ProvisionResult<Self> {
        let path = Self::path_for(app_dir, app_name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ProvisionError::io(&path, e))?;
        Self::parse(path, &text)
    }

    pub fn parse(path: PathBuf, text: &str) -> ProvisionResult<Self> {
        let invalid = |message: String| {
            ProvisionError::invalid_spec(
                ResourceKind::Workload,
                format!("{}: {message}", path.display()),
            )
        };

        let mut deployment = None;
        let mut service = None;
        for document in serde_yaml::Deserializer::from_str(text) {
            let value = Value::deserialize(document).map_err(|e| invalid(e.to_string()))?;
            match value.get("kind").and_then(Value::as_str) {
                Some("Deployment") => deployment = Some(value),
                Some("Service") => service = Some(value),
                _ => {}
            }
        }

        let deployment =
            deployment.ok_or_else(|| invalid("no Deployment document".to_string()))?;
        if service
            .as_ref()
            .is_some_and(|s| s.pointer("/metadata/name").and_then(Value::as_str).is_none())
        {
            return Err(invalid("Service has no metadata.name".to_string()));
        }
        Ok(Self {
            path,
            deployment,
            service,
        })
    }

    /// The service document, required when creating the workload.
    pub fn require_service(&self) -> ProvisionResult<&Value> {
        self.service.as_ref().ok_or_else(|| {
            ProvisionError::invalid_spec(
                ResourceKind::Workload,
                format!("{}: no Service document", self.path.display()),
            )
        })
    }

    /// Name of the required service document.
    pub fn service_name(&self) -> ProvisionResult<&str> {
        let service = self.require_service()?;
        service
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProvisionError::invalid_spec(
                    ResourceKind::Workload,
                    format!("{}: Service has no metadata.name", self.path.display()),
                )
            })
    }

    pub fn deployment_name(&self) -> ProvisionResult<&str> {
        self.deployment
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProvisionError::invalid_spec(
                    ResourceKind::Workload,
                    format!("{}: Deployment has no metadata.name", self.path.display()),
                )
            })
    }

    pub fn replicas(&self) -> u64 {
        self.deployment
            .pointer("/spec/replicas")
            .and_then(Value::as_u64)
            .unwrap_or(1)
    }

    /// The deployment document with its replica count replaced.
    pub fn with_replicas(&self, replicas: u64) -> Value {
        let mut deployment = self.deployment.clone();
        if let Some(spec) = deployment.get_mut("spec").and_then(Value::as_object_mut) {
            spec.insert("replicas".to_string(), json!(replicas));
        }
        deployment
    }

    /// The deployment document with the restart annotation set to `stamp`,
    /// which makes the cluster replace every pod.
    pub fn with_restart_annotation(&self, stamp: &str) -> Value {
        let mut deployment = self.deployment.clone();
        if let Some(template) = deployment
            .pointer_mut("/spec/template")
            .and_then(Value::as_object_mut)
        {
            let metadata = template
                .entry("metadata")
                .or_insert_with(|| json!({}));
            if let Some(metadata) = metadata.as_object_mut() {
                let annotations = metadata
                    .entry("annotations")
                    .or_insert_with(|| json!({}));
                if let Some(annotations) = annotations.as_object_mut() {
                    annotations.insert(RESTART_ANNOTATION.to_string(), json!(stamp));
                }
            }
        }
        deployment
    }
}

/// Service name declared in `<app_dir>/app.yaml`, `default` when absent.
pub async fn managed_app_service(app_dir: &Path) -> ProvisionResult<String> {
    #[derive(Deserialize)]
    struct AppYaml {
        service: Option<String>,
    }

    let path = app_dir.join("app.yaml");
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ProvisionError::io(&path, e))?;
    let parsed: AppYaml = serde_yaml::from_str(&text).map_err(|e| {
        ProvisionError::invalid_spec(ResourceKind::ManagedApp, format!("{}: {e}", path.display()))
    })?;
    Ok(parsed.service.unwrap_or_else(|| "default".to_string()))
}

/// Public URL of a managed-app service.
pub fn managed_app_url(project_id: &str, service: &str) -> String {
    if service == "default" {
        format!("https://{project_id}.appspot.com/")
    } else {
        format!("https://{service}-dot-{project_id}.appspot.com")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: shop
  labels:
    app: shop
spec:
  replicas: 3
  template:
    metadata:
      labels:
        app: shop
    spec:
      containers:
        - name: shop-app
          image: gcr.io/demo-123456/shop
---
apiVersion: v1
kind: Service
metadata:
  name: shop
spec:
  type: LoadBalancer
"#;

    fn manifest() -> WorkloadManifest {
        WorkloadManifest::parse(PathBuf::from("shop.yaml"), MANIFEST).unwrap()
    }

    #[test]
    fn parses_both_documents() {
        let m = manifest();
        assert_eq!(m.deployment_name().unwrap(), "shop");
        assert_eq!(m.service_name().unwrap(), "shop");
        assert_eq!(m.replicas(), 3);
        assert!(m.require_service().is_ok());
    }

    #[test]
    fn missing_deployment_is_invalid() {
        let only_service = "kind: Service\nmetadata:\n  name: shop\n";
        let err = WorkloadManifest::parse(PathBuf::from("x.yaml"), only_service).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidSpec { .. }));
    }

    #[test]
    fn unnamed_service_is_invalid() {
        let unnamed = "kind: Deployment\nmetadata:\n  name: shop\n---\nkind: Service\nspec:\n  type: LoadBalancer\n";
        let err = WorkloadManifest::parse(PathBuf::from("x.yaml"), unnamed).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::InvalidSpec {
                resource: ResourceKind::Workload,
                ..
            }
        ));
        assert!(err.to_string().contains("Service has no metadata.name"));
    }

    #[test]
    fn missing_service_only_fails_when_required() {
        let only_deployment = "kind: Deployment\nmetadata:\n  name: shop\nspec: {}\n";
        let m = WorkloadManifest::parse(PathBuf::from("x.yaml"), only_deployment).unwrap();
        assert!(m.require_service().is_err());
        assert_eq!(m.replicas(), 1);
    }

    #[test]
    fn replica_override_leaves_original_untouched() {
        let m = manifest();
        let scaled = m.with_replicas(0);
        assert_eq!(scaled.pointer("/spec/replicas"), Some(&json!(0)));
        assert_eq!(m.replicas(), 3);
    }

    #[test]
    fn restart_annotation_is_added_to_pod_template() {
        let patched = manifest().with_restart_annotation("2026-01-01T00:00:00Z");
        let annotations = patched
            .pointer("/spec/template/metadata/annotations")
            .unwrap();
        assert_eq!(annotations[RESTART_ANNOTATION], "2026-01-01T00:00:00Z");
        assert_eq!(
            patched.pointer("/spec/template/metadata/labels/app"),
            Some(&json!("shop"))
        );
    }

    #[test]
    fn managed_app_urls() {
        assert_eq!(
            managed_app_url("demo-123456", "default"),
            "https://demo-123456.appspot.com/"
        );
        assert_eq!(
            managed_app_url("demo-123456", "api"),
            "https://api-dot-demo-123456.appspot.com"
        );
    }

    #[tokio::test]
    async fn service_name_defaults_when_undeclared() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.yaml"), "runtime: python37\n").unwrap();
        assert_eq!(managed_app_service(dir.path()).await.unwrap(), "default");

        std::fs::write(dir.path().join("app.yaml"), "runtime: python37\nservice: api\n").unwrap();
        assert_eq!(managed_app_service(dir.path()).await.unwrap(), "api");
    }
}
