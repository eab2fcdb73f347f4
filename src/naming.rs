//! # Resource Naming
//!
//! Deterministic derivation of cloud resource names from an application name
//! and a project id. Sanitization is stable across runs; the only random part
//! is the numeric suffix of a generated project id, which is produced once and
//! then persisted in the deployment record.

use crate::constants::ResourceKind;
use crate::error::{ProvisionError, ProvisionResult};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Longest prefix kept before the random suffix is appended.
const PROJECT_ID_PREFIX_LEN: usize = 23;

/// Provider length limits for derived names.
pub const CLUSTER_NAME_MAX: usize = 40;
pub const DATABASE_INSTANCE_NAME_MAX: usize = 63;
pub const DATABASE_NAME_MAX: usize = 63;

static PROJECT_ID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn project_id_pattern() -> &'static Regex {
    PROJECT_ID_PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9-]{5,29}$").expect("project id pattern compiles")
    })
}

/// Lowercase the name and replace underscores with dashes.
pub fn sanitize_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

/// Cut `name` to at most `max` characters without leaving a trailing dash.
pub fn truncate_name(name: &str, max: usize) -> String {
    let cut: String = name.chars().take(max).collect();
    cut.trim_end_matches('-').to_string()
}

fn suffixed(app: &str, suffix: &str, max: usize) -> String {
    let room = max.saturating_sub(suffix.len());
    format!("{}{suffix}", truncate_name(app, room))
}

/// Build a globally unique project id from a human readable project name.
///
/// The result always satisfies [`validate_project_id`].
pub fn generate_project_id(project_name: &str) -> String {
    let mut base: String = project_name
        .to_lowercase()
        .replace([' ', '_'], "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();

    if !base.starts_with(|c: char| c.is_ascii_lowercase()) {
        base.insert_str(0, "app-");
    }
    base.truncate(PROJECT_ID_PREFIX_LEN);

    let suffix: u32 = rand::rng().random_range(100_000..=999_999);
    format!("{base}-{suffix}")
}

pub fn validate_project_id(project_id: &str) -> ProvisionResult<()> {
    if project_id_pattern().is_match(project_id) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidName {
            resource: ResourceKind::Project,
            name: project_id.to_string(),
            message: "must be 6 to 30 lowercase letters, digits or hyphens and start with a letter"
                .to_string(),
        })
    }
}

/// A resource the pipeline manages, identified by kind and natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceDescriptor {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Every name derived for one application inside one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNames {
    pub project_id: String,
    /// Sanitized application name, not truncated.
    pub app_name: String,
    pub cluster: String,
    pub database: String,
    pub database_instance: String,
    pub image_tag: String,
    pub static_bucket: String,
    pub secrets_bucket: String,
}

impl ResourceNames {
    pub fn derive(project_id: &str, app_name: &str, bucket_override: Option<&str>) -> Self {
        let app = sanitize_name(app_name);
        Self {
            project_id: project_id.to_string(),
            cluster: truncate_name(&app, CLUSTER_NAME_MAX),
            database: suffixed(&app, "-db", DATABASE_NAME_MAX),
            database_instance: suffixed(&app, "-instance", DATABASE_INSTANCE_NAME_MAX),
            image_tag: format!("gcr.io/{project_id}/{app}"),
            static_bucket: bucket_override.unwrap_or(project_id).to_string(),
            secrets_bucket: format!("secrets-{project_id}"),
            app_name: app,
        }
    }

    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        vec![
            ResourceDescriptor::new(ResourceKind::Project, &self.project_id),
            ResourceDescriptor::new(ResourceKind::DatabaseInstance, &self.database_instance),
            ResourceDescriptor::new(ResourceKind::Database, &self.database),
            ResourceDescriptor::new(ResourceKind::Bucket, &self.static_bucket),
            ResourceDescriptor::new(ResourceKind::Cluster, &self.cluster),
            ResourceDescriptor::new(ResourceKind::ContainerImage, &self.image_tag),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_dashes() {
        assert_eq!(sanitize_name("My_Shop"), "my-shop");
        assert_eq!(sanitize_name("already-fine"), "already-fine");
    }

    #[test]
    fn generated_ids_are_valid() {
        for name in ["Polls", "123 numbers first", "a very long project name with spaces", "x"] {
            let id = generate_project_id(name);
            assert!(id.len() <= 30, "{id} too long");
            validate_project_id(&id).unwrap();
        }
    }

    #[test]
    fn generated_id_prefixes_non_letters() {
        let id = generate_project_id("9lives");
        assert!(id.starts_with("app-9lives-"), "{id}");
    }

    #[test]
    fn invalid_project_id_is_rejected() {
        let err = validate_project_id("Bad_Project").unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::InvalidName {
                resource: ResourceKind::Project,
                ..
            }
        ));
        assert!(validate_project_id("short").is_err());
        assert!(validate_project_id("demo-123456").is_ok());
    }

    #[test]
    fn names_derive_from_app_and_project() {
        let names = ResourceNames::derive("demo-123456", "My_Shop", None);
        assert_eq!(names.cluster, "my-shop");
        assert_eq!(names.database, "my-shop-db");
        assert_eq!(names.database_instance, "my-shop-instance");
        assert_eq!(names.image_tag, "gcr.io/demo-123456/my-shop");
        assert_eq!(names.static_bucket, "demo-123456");
        assert_eq!(names.secrets_bucket, "secrets-demo-123456");

        let custom = ResourceNames::derive("demo-123456", "shop", Some("shop-assets"));
        assert_eq!(custom.static_bucket, "shop-assets");
    }

    #[test]
    fn long_app_names_fit_provider_limits() {
        let names = ResourceNames::derive(
            "demo-123456",
            "a_very_long_application_name_that_exceeds_cluster_limits",
            None,
        );
        assert_eq!(names.cluster, "a-very-long-application-name-that-exceed");
        assert!(names.cluster.len() <= CLUSTER_NAME_MAX);
        assert!(names.database.ends_with("-db"));
        assert!(names.database.len() <= DATABASE_NAME_MAX);
        assert!(names.database_instance.ends_with("-instance"));
        assert!(names.database_instance.len() <= DATABASE_INSTANCE_NAME_MAX);
        assert_eq!(
            names.app_name,
            "a-very-long-application-name-that-exceeds-cluster-limits"
        );
    }

    #[test]
    fn truncation_drops_a_trailing_dash() {
        assert_eq!(truncate_name("abc-def", 4), "abc");
        assert_eq!(truncate_name("abc---", 5), "abc");
        assert_eq!(truncate_name("short", 40), "short");
    }

    #[test]
    fn descriptor_display() {
        let d = ResourceDescriptor::new(ResourceKind::Bucket, "assets");
        assert_eq!(d.to_string(), "bucket/assets");
    }
}
