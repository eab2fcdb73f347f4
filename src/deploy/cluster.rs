//! Cluster-backed deployment.

use super::manifest::WorkloadManifest;
use super::{DeployContext, DeploymentDriver};
use crate::clients::{ClusterAccess, ImageBuilder, KubernetesApi};
use crate::config::RolloutStrategy;
use crate::constants::{Backend, ResourceKind};
use crate::error::{ErrorCategory, ProvisionError, ProvisionResult};
use crate::provisioners::{ClusterProvisioner, ClusterSpec};
use crate::resilience::PollPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ClusterDriver {
    cluster: ClusterProvisioner,
    images: Arc<dyn ImageBuilder>,
    kubernetes: Arc<dyn KubernetesApi>,
    reachability: PollPolicy,
    rollout: RolloutStrategy,
    namespace: String,
}

impl ClusterDriver {
    pub fn new(
        cluster: ClusterProvisioner,
        images: Arc<dyn ImageBuilder>,
        kubernetes: Arc<dyn KubernetesApi>,
        reachability: PollPolicy,
        rollout: RolloutStrategy,
        namespace: String,
    ) -> Self {
        Self {
            cluster,
            images,
            kubernetes,
            reachability,
            rollout,
            namespace,
        }
    }

    fn cluster_spec(ctx: &DeployContext) -> ClusterSpec {
        ClusterSpec {
            name: ctx.names.cluster.clone(),
            region: ctx.region.clone(),
            zone: ctx.zone.clone(),
        }
    }

    async fn publish_image(&self, ctx: &DeployContext) -> ProvisionResult<()> {
        let tag = ctx.names.image_tag.as_str();
        self.images
            .build(tag, &ctx.app_dir)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::ContainerImage, tag, e))?;
        self.images
            .push(tag)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::ContainerImage, tag, e))?;
        info!(image = %tag, "🐳 Image pushed");
        Ok(())
    }

    async fn create_secrets(
        &self,
        access: &ClusterAccess,
        ctx: &DeployContext,
    ) -> ProvisionResult<()> {
        for secret in ctx.secrets.to_kube_secrets() {
            match self
                .kubernetes
                .create_secret(access, &self.namespace, &secret)
                .await
            {
                Ok(()) => info!(secret = %secret.name, "🔐 Secret created"),
                Err(e) if e.is_conflict() => info!(
                    secret = %secret.name,
                    category = %ErrorCategory::ReusableConflict,
                    "🔐 Secret already exists"
                ),
                Err(source) => {
                    return Err(ProvisionError::from_api(
                        ResourceKind::Secret,
                        &secret.name,
                        source,
                    ))
                }
            }
        }
        Ok(())
    }

    async fn apply_deployment(
        &self,
        access: &ClusterAccess,
        manifest: &WorkloadManifest,
    ) -> ProvisionResult<()> {
        let name = manifest.deployment_name()?;
        match self
            .kubernetes
            .create_deployment(access, &self.namespace, &manifest.deployment)
            .await
        {
            Ok(()) => {
                info!(deployment = %name, "📦 Deployment created");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                info!(
                    deployment = %name,
                    category = %ErrorCategory::ReusableConflict,
                    "📦 Deployment exists, applying manifest"
                );
                self.patch(access, name, &manifest.deployment).await
            }
            Err(source) => Err(ProvisionError::from_api(ResourceKind::Workload, name, source)),
        }
    }

    async fn apply_service(
        &self,
        access: &ClusterAccess,
        manifest: &WorkloadManifest,
    ) -> ProvisionResult<()> {
        let service = manifest.require_service()?;
        let name = manifest.service_name()?;
        match self
            .kubernetes
            .create_service(access, &self.namespace, service)
            .await
        {
            Ok(()) => info!(service = %name, "🌐 Service created"),
            Err(e) if e.is_conflict() => info!(
                service = %name,
                category = %ErrorCategory::ReusableConflict,
                "🌐 Service already exists"
            ),
            Err(source) => {
                return Err(ProvisionError::from_api(ResourceKind::Workload, name, source))
            }
        }
        Ok(())
    }

    async fn patch(
        &self,
        access: &ClusterAccess,
        name: &str,
        deployment: &serde_json::Value,
    ) -> ProvisionResult<()> {
        self.kubernetes
            .patch_deployment(access, &self.namespace, name, deployment)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::Workload, name, e))
    }

    /// Replace every pod of the deployment with one running the new image.
    async fn roll_pods(
        &self,
        access: &ClusterAccess,
        manifest: &WorkloadManifest,
    ) -> ProvisionResult<()> {
        let name = manifest.deployment_name()?;
        match self.rollout {
            RolloutStrategy::Native => {
                let stamp = chrono::Utc::now().to_rfc3339();
                self.patch(access, name, &manifest.with_restart_annotation(&stamp))
                    .await?;
                info!(deployment = %name, restarted_at = %stamp, "🔄 Rolling restart requested");
            }
            RolloutStrategy::ScaleToZero => {
                let replicas = manifest.replicas();
                self.patch(access, name, &manifest.with_replicas(0)).await?;
                self.patch(access, name, &manifest.with_replicas(replicas))
                    .await?;
                info!(deployment = %name, replicas = replicas, "🔄 Scaled to zero and back");
            }
        }
        Ok(())
    }

    fn not_ready(&self, name: &str) -> ProvisionError {
        ProvisionError::NotReady {
            resource: ResourceKind::Workload,
            name: name.to_string(),
            polls: self.reachability.max_polls.unwrap_or_default(),
        }
    }

    async fn wait_for_ready_replicas(
        &self,
        access: &ClusterAccess,
        ctx: &DeployContext,
    ) -> ProvisionResult<u32> {
        let selector = ctx.label_selector();
        let kube = self.kubernetes.as_ref();
        let label = selector.as_str();
        let ready = self
            .reachability
            .poll_until(move || async move {
                kube.ready_replicas(access, label)
                    .await
                    .map(|count| (count > 0).then_some(count))
            })
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::Workload, &ctx.app_name, e))?;

        match ready {
            Some(count) => {
                info!(workload = %ctx.app_name, ready_replicas = count, "✅ Workload ready");
                Ok(count)
            }
            None => {
                warn!(workload = %ctx.app_name, "⏳ Workload never reported ready replicas");
                Err(self.not_ready(&ctx.app_name))
            }
        }
    }

    async fn wait_for_ingress(
        &self,
        access: &ClusterAccess,
        ctx: &DeployContext,
    ) -> ProvisionResult<String> {
        let selector = ctx.label_selector();
        let kube = self.kubernetes.as_ref();
        let label = selector.as_str();
        let address = self
            .reachability
            .poll_until(move || async move {
                kube.ingress_addresses(access, label)
                    .await
                    .map(|addresses| addresses.into_iter().find(|a| !a.is_empty()))
            })
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::Workload, &ctx.app_name, e))?;

        match address {
            Some(address) => Ok(format!("http://{address}/")),
            None => {
                warn!(workload = %ctx.app_name, "⏳ No ingress address was published");
                Err(self.not_ready(&ctx.app_name))
            }
        }
    }
}

#[async_trait]
impl DeploymentDriver for ClusterDriver {
    fn backend(&self) -> Backend {
        Backend::Cluster
    }

    async fn deploy(&self, ctx: &DeployContext) -> ProvisionResult<String> {
        let spec = Self::cluster_spec(ctx);
        self.cluster.ensure(&ctx.project_id, &spec).await?;
        self.publish_image(ctx).await?;

        let manifest = WorkloadManifest::load(&ctx.app_dir, &ctx.app_name).await?;
        manifest.require_service()?;

        let access = self.cluster.access(&ctx.project_id, &spec).await?;
        self.create_secrets(&access, ctx).await?;
        self.apply_deployment(&access, &manifest).await?;
        self.wait_for_ready_replicas(&access, ctx).await?;
        self.apply_service(&access, &manifest).await?;

        let url = self.wait_for_ingress(&access, ctx).await?;
        info!(project_id = %ctx.project_id, url = %url, "🚀 Application deployed to cluster");
        Ok(url)
    }

    async fn update(&self, ctx: &DeployContext) -> ProvisionResult<String> {
        let spec = Self::cluster_spec(ctx);
        self.publish_image(ctx).await?;

        let manifest = WorkloadManifest::load(&ctx.app_dir, &ctx.app_name).await?;
        let access = self.cluster.access(&ctx.project_id, &spec).await?;
        self.roll_pods(&access, &manifest).await?;
        self.wait_for_ready_replicas(&access, ctx).await?;

        let url = self.wait_for_ingress(&access, ctx).await?;
        info!(project_id = %ctx.project_id, url = %url, "🚀 Cluster deployment updated");
        Ok(url)
    }
}
