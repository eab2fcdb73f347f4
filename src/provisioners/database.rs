//! Managed database instance, application database and credentials.

use super::poll_failure;
use crate::clients::{
    DatabaseTarget, DatabaseTooling, InstanceDefinition, SqlAdminApi, Superuser,
};
use crate::constants::{status_tables, ResourceKind};
use crate::error::{ErrorCategory, ProvisionError, ProvisionResult};
use crate::resilience::PollPolicy;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::info;

pub const CPU_RANGE: RangeInclusive<u32> = 1..=64;
pub const MEMORY_MB_RANGE: RangeInclusive<u32> = 3_840..=425_984;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub region: String,
    pub database_version: String,
    pub cpus: u32,
    pub memory_mb: u32,
}

impl InstanceSpec {
    pub fn tier(&self) -> String {
        format!("db-custom-{}-{}", self.cpus, self.memory_mb)
    }

    pub fn validate(&self) -> ProvisionResult<()> {
        if !CPU_RANGE.contains(&self.cpus) {
            return Err(ProvisionError::invalid_spec(
                ResourceKind::DatabaseInstance,
                format!(
                    "{} CPUs requested, must be between {} and {}",
                    self.cpus,
                    CPU_RANGE.start(),
                    CPU_RANGE.end()
                ),
            ));
        }
        if !MEMORY_MB_RANGE.contains(&self.memory_mb) {
            return Err(ProvisionError::invalid_spec(
                ResourceKind::DatabaseInstance,
                format!(
                    "{} MiB of memory requested, must be between {} and {}",
                    self.memory_mb,
                    MEMORY_MB_RANGE.start(),
                    MEMORY_MB_RANGE.end()
                ),
            ));
        }
        Ok(())
    }

    fn definition(&self) -> InstanceDefinition {
        InstanceDefinition {
            name: self.name.clone(),
            region: self.region.clone(),
            database_version: self.database_version.clone(),
            tier: self.tier(),
        }
    }
}

#[derive(Clone)]
pub struct DatabaseProvisioner {
    sql: Arc<dyn SqlAdminApi>,
    tooling: Arc<dyn DatabaseTooling>,
    poll: PollPolicy,
}

impl DatabaseProvisioner {
    pub fn new(
        sql: Arc<dyn SqlAdminApi>,
        tooling: Arc<dyn DatabaseTooling>,
        poll: PollPolicy,
    ) -> Self {
        Self { sql, tooling, poll }
    }

    /// Create the instance, or reuse an existing one, and wait until it runs.
    pub async fn ensure_instance(
        &self,
        project_id: &str,
        spec: &InstanceSpec,
    ) -> ProvisionResult<()> {
        spec.validate()?;
        let name = spec.name.as_str();

        match self.sql.insert_instance(project_id, &spec.definition()).await {
            Ok(()) => info!(
                project_id = %project_id,
                instance = %name,
                tier = %spec.tier(),
                "🗄️ Database instance creation started"
            ),
            Err(e) if e.is_conflict() => info!(
                project_id = %project_id,
                instance = %name,
                category = %ErrorCategory::ReusableConflict,
                "🗄️ Database instance already exists"
            ),
            Err(source) => {
                return Err(ProvisionError::from_api(
                    ResourceKind::DatabaseInstance,
                    name,
                    source,
                ))
            }
        }

        let sql = self.sql.as_ref();
        self.poll
            .await_ready(&status_tables::DATABASE_INSTANCE, name, move || async move {
                sql.get_instance(project_id, name).await.map(|i| i.state)
            })
            .await
            .map_err(|e| poll_failure(ResourceKind::DatabaseInstance, name, e))?;
        Ok(())
    }

    pub async fn ensure_database(
        &self,
        project_id: &str,
        instance: &str,
        database: &str,
    ) -> ProvisionResult<()> {
        let first_status = match self.sql.insert_database(project_id, instance, database).await {
            Ok(operation) => Some(operation.status),
            Err(e) if e.is_conflict() => {
                info!(
                    instance = %instance,
                    database = %database,
                    category = %ErrorCategory::ReusableConflict,
                    "🗄️ Database already exists"
                );
                None
            }
            Err(source) => {
                return Err(ProvisionError::from_api(
                    ResourceKind::Database,
                    database,
                    source,
                ))
            }
        };

        // The insert response already carries the first status.
        let mut seeded = first_status;
        let sql = self.sql.as_ref();
        self.poll
            .await_ready(&status_tables::DATABASE, database, move || {
                let seeded = seeded.take();
                async move {
                    match seeded {
                        Some(status) => Ok(status),
                        None => sql
                            .get_database(project_id, instance, database)
                            .await
                            .map(|op| op.status),
                    }
                }
            })
            .await
            .map_err(|e| poll_failure(ResourceKind::Database, database, e))?;

        info!(instance = %instance, database = %database, "🗄️ Database ready");
        Ok(())
    }

    pub async fn set_password(
        &self,
        project_id: &str,
        instance: &str,
        user: &str,
        password: &str,
    ) -> ProvisionResult<()> {
        let operation = self
            .sql
            .set_user_password(project_id, instance, user, password)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::DatabaseUser, user, e))?;

        if status_tables::DATABASE.ready.contains(&operation.status.as_str()) {
            info!(instance = %instance, user = %user, "🔑 Database password set");
            Ok(())
        } else {
            Err(ProvisionError::UnexpectedStatus {
                resource: ResourceKind::DatabaseUser,
                name: user.to_string(),
                status: operation.status,
            })
        }
    }

    pub async fn migrate(&self, target: &DatabaseTarget) -> ProvisionResult<()> {
        self.tooling
            .migrate(target)
            .await
            .map_err(|e| ProvisionError::from_api(ResourceKind::Database, &target.instance, e))?;
        info!(instance = %target.instance, "🗄️ Database migrated");
        Ok(())
    }

    /// Returns `false` when the superuser was already there.
    pub async fn ensure_superuser(
        &self,
        target: &DatabaseTarget,
        superuser: &Superuser,
    ) -> ProvisionResult<bool> {
        let to_error =
            |e| ProvisionError::from_api(ResourceKind::DatabaseUser, &superuser.username, e);

        if self
            .tooling
            .superuser_exists(target, &superuser.username)
            .await
            .map_err(to_error)?
        {
            info!(username = %superuser.username, "👤 Superuser already exists");
            return Ok(false);
        }

        self.tooling
            .create_superuser(target, superuser)
            .await
            .map_err(to_error)?;
        info!(username = %superuser.username, "👤 Superuser created");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(cpus: u32, memory_mb: u32) -> InstanceSpec {
        InstanceSpec {
            name: "shop-instance".into(),
            region: "us-west1".into(),
            database_version: "POSTGRES_9_6".into(),
            cpus,
            memory_mb,
        }
    }

    #[test]
    fn tier_encodes_cpu_and_memory() {
        assert_eq!(spec(2, 7_680).tier(), "db-custom-2-7680");
    }

    #[test]
    fn out_of_range_sizes_are_rejected() {
        assert!(spec(1, 3_840).validate().is_ok());
        assert!(matches!(
            spec(0, 3_840).validate(),
            Err(ProvisionError::InvalidSpec { .. })
        ));
        assert!(spec(65, 3_840).validate().is_err());
        assert!(spec(1, 1_024).validate().is_err());
        assert!(spec(1, 500_000).validate().is_err());
    }
}
