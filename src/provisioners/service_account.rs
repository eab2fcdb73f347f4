//! Service accounts, their project role bindings and their keys.

use crate::clients::IamApi;
use crate::config::ServiceAccountSpec;
use crate::constants::ResourceKind;
use crate::error::{ApiErrorKind, ErrorCategory, ProvisionError, ProvisionResult};
use crate::policy::PolicyDocument;
use crate::resilience::RetryPolicy;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tracing::info;

pub fn service_account_email(account_id: &str, project_id: &str) -> String {
    format!("{account_id}@{project_id}.iam.gserviceaccount.com")
}

pub fn service_account_member(account_id: &str, project_id: &str) -> String {
    format!("serviceAccount:{}", service_account_email(account_id, project_id))
}

#[derive(Clone)]
pub struct ServiceAccountProvisioner {
    iam: Arc<dyn IamApi>,
    retry: RetryPolicy,
}

impl ServiceAccountProvisioner {
    pub fn new(iam: Arc<dyn IamApi>, retry: RetryPolicy) -> Self {
        Self { iam, retry }
    }

    /// Create the account (an existing one is reused) and grant its roles.
    /// Returns the account email.
    pub async fn ensure(
        &self,
        project_id: &str,
        account: &ServiceAccountSpec,
    ) -> ProvisionResult<String> {
        match self
            .iam
            .create_service_account(project_id, &account.id, &account.name)
            .await
        {
            Ok(created) if created.name.is_empty() => {
                return Err(ProvisionError::unexpected_response(
                    ResourceKind::ServiceAccount,
                    format!("creating {} returned no account name", account.id),
                ))
            }
            Ok(_) => info!(
                project_id = %project_id,
                account = %account.id,
                "🪪 Service account created"
            ),
            Err(e) if e.is_conflict() => info!(
                project_id = %project_id,
                account = %account.id,
                category = %ErrorCategory::ReusableConflict,
                "🪪 Service account already exists"
            ),
            Err(e) if e.kind == ApiErrorKind::InvalidArgument => {
                return Err(ProvisionError::InvalidName {
                    resource: ResourceKind::ServiceAccount,
                    name: account.id.clone(),
                    message: e.message,
                })
            }
            Err(source) => {
                return Err(ProvisionError::from_api(
                    ResourceKind::ServiceAccount,
                    &account.id,
                    source,
                ))
            }
        }

        self.grant_roles(project_id, &account.id, &account.roles).await?;
        Ok(service_account_email(&account.id, project_id))
    }

    /// Merge the account into each role of the project policy.
    pub async fn grant_roles(
        &self,
        project_id: &str,
        account_id: &str,
        roles: &[String],
    ) -> ProvisionResult<()> {
        if roles.is_empty() {
            return Ok(());
        }

        let member = service_account_member(account_id, project_id);
        let iam = self.iam.as_ref();
        let member_ref = member.as_str();

        self.retry
            .read_modify_write(
                "project_policy",
                move || iam.get_project_policy(project_id),
                |policy: PolicyDocument| policy.grant(member_ref, roles),
                move |policy| async move { iam.set_project_policy(project_id, &policy).await },
            )
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    ProvisionError::RetriesExhausted {
                        resource: ResourceKind::RoleBinding,
                        attempts: self.retry.max_tries,
                        source: e,
                    }
                } else {
                    ProvisionError::from_api(ResourceKind::RoleBinding, member_ref, e)
                }
            })?;

        info!(
            project_id = %project_id,
            member = %member,
            roles = ?roles,
            "🔐 Roles granted"
        );
        Ok(())
    }

    /// Create a key for the account and return the decoded key file.
    pub async fn create_key(&self, project_id: &str, account_id: &str) -> ProvisionResult<String> {
        let email = service_account_email(account_id, project_id);
        let key = self
            .iam
            .create_key(project_id, &email)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::ServiceAccount, &email, e))?;

        let bytes = STANDARD.decode(key.private_key_data.as_bytes()).map_err(|e| {
            ProvisionError::unexpected_response(
                ResourceKind::ServiceAccount,
                format!("key for {email} is not valid base64: {e}"),
            )
        })?;
        String::from_utf8(bytes).map_err(|e| {
            ProvisionError::unexpected_response(
                ResourceKind::ServiceAccount,
                format!("key for {email} is not UTF-8: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_uses_service_account_prefix() {
        assert_eq!(
            service_account_member("proxy", "demo-123456"),
            "serviceAccount:proxy@demo-123456.iam.gserviceaccount.com"
        );
    }
}
