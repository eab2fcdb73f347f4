//! # Error Types
//!
//! Two layers of errors flow through the orchestrator:
//!
//! - [`ApiError`]: what a cloud client reports. It carries an [`ApiErrorKind`]
//!   that mirrors the HTTP status families the provisioners branch on.
//! - [`ProvisionError`]: what a provisioner, driver or pipeline step reports.
//!   Every resource-scoped variant names the [`ResourceKind`] it concerns and
//!   maps to an [`ErrorCategory`] through [`ProvisionError::category`].

use crate::config::ConfigurationError;
use crate::constants::ResourceKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse classification of a remote API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    NotFound,
    PermissionDenied,
    Conflict,
    InvalidArgument,
    Unknown,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::Conflict => "conflict",
            Self::InvalidArgument => "invalid argument",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Failure reported by a cloud API client or external command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::PermissionDenied, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Conflict, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::InvalidArgument, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unknown, message)
    }

    /// Map an HTTP status code returned by a REST endpoint.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 => ApiErrorKind::InvalidArgument,
            403 => ApiErrorKind::PermissionDenied,
            404 => ApiErrorKind::NotFound,
            409 => ApiErrorKind::Conflict,
            _ => ApiErrorKind::Unknown,
        };
        Self::new(kind, message)
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ApiErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }

    pub fn is_permission_denied(&self) -> bool {
        self.kind == ApiErrorKind::PermissionDenied
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that a read-modify-write retry loop can recognise as conflicts.
pub trait ConflictAware {
    fn is_conflict(&self) -> bool;
}

impl ConflictAware for ApiError {
    fn is_conflict(&self) -> bool {
        ApiError::is_conflict(self)
    }
}

/// How the orchestrator treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Abort the pipeline immediately.
    Fatal,
    /// The resource already exists and is ours to reuse.
    ReusableConflict,
    /// The name is taken by something we do not own.
    UnresolvableConflict,
    /// Retried with backoff until the attempt budget runs out.
    Transient,
    /// A polled resource settled in a status outside its ready set.
    UnexpectedTerminalState,
}

impl ErrorCategory {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ReusableConflict | Self::Transient)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fatal => "fatal",
            Self::ReusableConflict => "reusable_conflict",
            Self::UnresolvableConflict => "unresolvable_conflict",
            Self::Transient => "transient",
            Self::UnexpectedTerminalState => "unexpected_terminal_state",
        };
        f.write_str(label)
    }
}

/// Errors raised while provisioning resources or deploying the application.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{resource} \"{name}\" already exists")]
    AlreadyExists { resource: ResourceKind, name: String },

    #[error("{resource} \"{name}\" does not exist")]
    DoesNotExist { resource: ResourceKind, name: String },

    #[error("permission denied on {resource} \"{name}\": {message}")]
    PermissionDenied {
        resource: ResourceKind,
        name: String,
        message: String,
    },

    #[error("invalid {resource} name \"{name}\": {message}")]
    InvalidName {
        resource: ResourceKind,
        name: String,
        message: String,
    },

    #[error("invalid {resource} specification: {message}")]
    InvalidSpec {
        resource: ResourceKind,
        message: String,
    },

    #[error("{resource} name \"{name}\" is taken by a resource outside project \"{project_id}\"")]
    NameTaken {
        resource: ResourceKind,
        name: String,
        project_id: String,
    },

    #[error("{resource} \"{name}\" reached unexpected status {status}")]
    UnexpectedStatus {
        resource: ResourceKind,
        name: String,
        status: String,
    },

    #[error("unexpected response from the {resource} API: {message}")]
    UnexpectedResponse {
        resource: ResourceKind,
        message: String,
    },

    #[error("{resource} \"{name}\" was not ready after {polls} polls")]
    NotReady {
        resource: ResourceKind,
        name: String,
        polls: u32,
    },

    #[error("{resource} operation gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        resource: ResourceKind,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("{resource} API call failed: {source}")]
    Api {
        resource: ResourceKind,
        #[source]
        source: ApiError,
    },

    #[error("step \"{step}\" needs \"{key}\" but no earlier step produced it")]
    MissingContext { step: String, key: String },

    #[error("deployment record at {path} is invalid: {message}")]
    InvalidRecord { path: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl ProvisionError {
    /// Translate a client failure into the error a provisioner reports for
    /// `name`, keeping permission and existence failures distinguishable.
    pub fn from_api(resource: ResourceKind, name: impl Into<String>, source: ApiError) -> Self {
        let name = name.into();
        match source.kind {
            ApiErrorKind::PermissionDenied => Self::PermissionDenied {
                resource,
                name,
                message: source.message,
            },
            ApiErrorKind::NotFound => Self::DoesNotExist { resource, name },
            _ => Self::Api { resource, source },
        }
    }

    pub fn unexpected_response(resource: ResourceKind, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            resource,
            message: message.into(),
        }
    }

    pub fn invalid_spec(resource: ResourceKind, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            resource,
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NameTaken { .. } => ErrorCategory::UnresolvableConflict,
            Self::UnexpectedStatus { .. } => ErrorCategory::UnexpectedTerminalState,
            Self::RetriesExhausted { .. } => ErrorCategory::Transient,
            Self::Api { source, .. } if source.is_conflict() => {
                ErrorCategory::UnresolvableConflict
            }
            _ => ErrorCategory::Fatal,
        }
    }

    /// The resource this error concerns, when it concerns one.
    pub fn resource(&self) -> Option<ResourceKind> {
        match self {
            Self::AlreadyExists { resource, .. }
            | Self::DoesNotExist { resource, .. }
            | Self::PermissionDenied { resource, .. }
            | Self::InvalidName { resource, .. }
            | Self::InvalidSpec { resource, .. }
            | Self::NameTaken { resource, .. }
            | Self::UnexpectedStatus { resource, .. }
            | Self::UnexpectedResponse { resource, .. }
            | Self::NotReady { resource, .. }
            | Self::RetriesExhausted { resource, .. }
            | Self::Api { resource, .. } => Some(*resource),
            Self::MissingContext { .. }
            | Self::InvalidRecord { .. }
            | Self::Io { .. }
            | Self::Configuration(_) => None,
        }
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_to_kind() {
        assert_eq!(
            ApiError::from_http_status(409, "dup").kind,
            ApiErrorKind::Conflict
        );
        assert_eq!(
            ApiError::from_http_status(403, "no").kind,
            ApiErrorKind::PermissionDenied
        );
        assert_eq!(
            ApiError::from_http_status(404, "gone").kind,
            ApiErrorKind::NotFound
        );
        assert_eq!(
            ApiError::from_http_status(400, "bad").kind,
            ApiErrorKind::InvalidArgument
        );
        assert_eq!(
            ApiError::from_http_status(500, "boom").kind,
            ApiErrorKind::Unknown
        );
    }

    #[test]
    fn from_api_keeps_permission_and_existence_apart() {
        let denied = ProvisionError::from_api(
            ResourceKind::Bucket,
            "assets",
            ApiError::permission_denied("caller lacks storage.buckets.create"),
        );
        assert!(matches!(denied, ProvisionError::PermissionDenied { .. }));

        let missing =
            ProvisionError::from_api(ResourceKind::Project, "p", ApiError::not_found("no"));
        assert!(matches!(missing, ProvisionError::DoesNotExist { .. }));

        let other = ProvisionError::from_api(ResourceKind::Cluster, "c", ApiError::unknown("x"));
        assert!(matches!(other, ProvisionError::Api { .. }));
    }

    #[test]
    fn categories_follow_failure_semantics() {
        let taken = ProvisionError::NameTaken {
            resource: ResourceKind::Bucket,
            name: "assets".into(),
            project_id: "p".into(),
        };
        assert_eq!(taken.category(), ErrorCategory::UnresolvableConflict);
        assert!(taken.category().is_fatal());

        let status = ProvisionError::UnexpectedStatus {
            resource: ResourceKind::Cluster,
            name: "c".into(),
            status: "ERROR".into(),
        };
        assert_eq!(status.category(), ErrorCategory::UnexpectedTerminalState);

        let exhausted = ProvisionError::RetriesExhausted {
            resource: ResourceKind::RoleBinding,
            attempts: 5,
            source: ApiError::conflict("etag mismatch"),
        };
        assert_eq!(exhausted.category(), ErrorCategory::Transient);
        assert_eq!(exhausted.resource(), Some(ResourceKind::RoleBinding));

        let exists = ProvisionError::AlreadyExists {
            resource: ResourceKind::Project,
            name: "p".into(),
        };
        assert_eq!(exists.category(), ErrorCategory::Fatal);
    }

    #[test]
    fn messages_name_the_resource() {
        let err = ProvisionError::NotReady {
            resource: ResourceKind::Workload,
            name: "shop".into(),
            polls: 3,
        };
        assert_eq!(err.to_string(), "workload \"shop\" was not ready after 3 polls");
    }
}
