//! Container cluster creation and access.

use super::poll_failure;
use crate::clients::{ClusterAccess, ClusterDefinition, ContainerApi};
use crate::constants::{status_tables, ResourceKind};
use crate::error::{ErrorCategory, ProvisionError, ProvisionResult};
use crate::resilience::PollPolicy;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tracing::info;

const DEFAULT_NODE_COUNT: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub name: String,
    pub region: String,
    pub zone: String,
}

#[derive(Clone)]
pub struct ClusterProvisioner {
    api: Arc<dyn ContainerApi>,
    poll: PollPolicy,
}

impl ClusterProvisioner {
    pub fn new(api: Arc<dyn ContainerApi>, poll: PollPolicy) -> Self {
        Self { api, poll }
    }

    /// Create the cluster, or reuse an existing one, and wait until it runs.
    pub async fn ensure(&self, project_id: &str, spec: &ClusterSpec) -> ProvisionResult<()> {
        let name = spec.name.as_str();
        let zone = spec.zone.as_str();

        let version = self
            .api
            .default_cluster_version(project_id, zone)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::Cluster, name, e))?;
        if version.is_empty() {
            return Err(ProvisionError::unexpected_response(
                ResourceKind::Cluster,
                format!("no default cluster version offered in {zone}"),
            ));
        }

        let definition = ClusterDefinition {
            name: name.to_string(),
            location: spec.region.clone(),
            initial_cluster_version: version,
            initial_node_count: DEFAULT_NODE_COUNT,
        };

        match self.api.create_cluster(project_id, zone, &definition).await {
            Ok(()) => info!(
                project_id = %project_id,
                cluster = %name,
                version = %definition.initial_cluster_version,
                "☸️ Cluster creation started"
            ),
            Err(e) if e.is_conflict() => info!(
                project_id = %project_id,
                cluster = %name,
                category = %ErrorCategory::ReusableConflict,
                "☸️ Cluster already exists"
            ),
            Err(source) => {
                return Err(ProvisionError::from_api(ResourceKind::Cluster, name, source))
            }
        }

        let api = self.api.as_ref();
        self.poll
            .await_ready(&status_tables::CLUSTER, name, move || async move {
                api.get_cluster(project_id, zone, name).await.map(|c| c.status)
            })
            .await
            .map_err(|e| poll_failure(ResourceKind::Cluster, name, e))?;

        info!(project_id = %project_id, cluster = %name, "☸️ Cluster running");
        Ok(())
    }

    /// Endpoint and CA certificate of a running cluster.
    pub async fn access(
        &self,
        project_id: &str,
        spec: &ClusterSpec,
    ) -> ProvisionResult<ClusterAccess> {
        let cluster = self
            .api
            .get_cluster(project_id, &spec.zone, &spec.name)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::Cluster, &spec.name, e))?;

        let (Some(endpoint), Some(ca)) = (cluster.endpoint, cluster.cluster_ca_certificate) else {
            return Err(ProvisionError::unexpected_response(
                ResourceKind::Cluster,
                format!("cluster {} has no endpoint or CA certificate", spec.name),
            ));
        };

        let ca_certificate = STANDARD.decode(ca.as_bytes()).map_err(|e| {
            ProvisionError::unexpected_response(
                ResourceKind::Cluster,
                format!("CA certificate of {} is not valid base64: {e}", spec.name),
            )
        })?;

        Ok(ClusterAccess {
            endpoint,
            ca_certificate,
        })
    }
}
