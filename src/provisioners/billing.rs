//! Billing account linkage.

use crate::clients::{BillingAccount, BillingApi, BillingInfo};
use crate::constants::ResourceKind;
use crate::error::{ProvisionError, ProvisionResult};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct BillingProvisioner {
    api: Arc<dyn BillingApi>,
}

impl BillingProvisioner {
    pub fn new(api: Arc<dyn BillingApi>) -> Self {
        Self { api }
    }

    pub async fn is_enabled(&self, project_id: &str) -> ProvisionResult<bool> {
        let info = self
            .api
            .get_billing_info(project_id)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::Billing, project_id, e))?;
        Ok(info.billing_enabled.unwrap_or(false))
    }

    /// Link `billing_account` unless billing is already on.
    pub async fn ensure(&self, project_id: &str, billing_account: &str) -> ProvisionResult<()> {
        if self.is_enabled(project_id).await? {
            info!(project_id = %project_id, "💳 Billing already enabled");
            return Ok(());
        }

        let BillingInfo {
            billing_enabled, ..
        } = self
            .api
            .update_billing_info(project_id, billing_account)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::Billing, project_id, e))?;

        match billing_enabled {
            Some(true) => {
                info!(project_id = %project_id, billing_account = %billing_account, "💳 Billing enabled");
                Ok(())
            }
            Some(false) => Err(ProvisionError::UnexpectedStatus {
                resource: ResourceKind::Billing,
                name: project_id.to_string(),
                status: "billing disabled after update".to_string(),
            }),
            None => Err(ProvisionError::unexpected_response(
                ResourceKind::Billing,
                format!("billing update for {project_id} did not report billingEnabled"),
            )),
        }
    }

    pub async fn list_accounts(&self, only_open: bool) -> ProvisionResult<Vec<BillingAccount>> {
        let accounts = self
            .api
            .list_billing_accounts()
            .await
            .map_err(|source| ProvisionError::Api {
                resource: ResourceKind::Billing,
                source,
            })?;
        Ok(accounts
            .into_iter()
            .filter(|account| !only_open || account.open)
            .collect())
    }
}
