//! Deploy job and deploy job component entities.

use chrono::{DateTime, Utc};
use domain::models::{ComponentRef, DeployJob, DeployJobComponent, MetadataType};
use domain::StoreError;
use sqlx::FromRow;

/// Database entity for the `deploy_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct DeployJobEntity {
    pub id: i64,
    pub job_id: i64,
    pub status: String,
    pub error: Option<String>,
    pub metadata_type: String,
    pub created_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DeployJobEntity> for DeployJob {
    type Error = StoreError;

    fn try_from(entity: DeployJobEntity) -> Result<Self, Self::Error> {
        let corrupt = |e: String| StoreError::Corrupt(format!("deploy job {}: {}", entity.id, e));
        let status = entity.status.parse().map_err(corrupt)?;
        let metadata_type = entity.metadata_type.parse().map_err(corrupt)?;

        Ok(DeployJob {
            id: entity.id,
            job_id: entity.job_id,
            status,
            error: entity.error,
            metadata_type,
            created_date: entity.created_date,
            updated_at: entity.updated_at,
        })
    }
}

/// Database entity for the `deploy_job_components` table.
///
/// Exactly one of the three reference columns is set (enforced by a CHECK
/// constraint).
#[derive(Debug, Clone, FromRow)]
pub struct DeployJobComponentEntity {
    pub id: i64,
    pub deploy_job_id: i64,
    pub validation_rule_id: Option<i64>,
    pub workflow_rule_id: Option<i64>,
    pub trigger_id: Option<i64>,
    pub enable: bool,
}

impl DeployJobComponentEntity {
    /// Splits a component reference into the three nullable columns.
    pub fn columns(component: ComponentRef) -> (Option<i64>, Option<i64>, Option<i64>) {
        match component {
            ComponentRef::ValidationRule(id) => (Some(id), None, None),
            ComponentRef::WorkflowRule(id) => (None, Some(id), None),
            ComponentRef::Trigger(id) => (None, None, Some(id)),
        }
    }
}

impl TryFrom<DeployJobComponentEntity> for DeployJobComponent {
    type Error = StoreError;

    fn try_from(entity: DeployJobComponentEntity) -> Result<Self, Self::Error> {
        let component = match (
            entity.validation_rule_id,
            entity.workflow_rule_id,
            entity.trigger_id,
        ) {
            (Some(id), None, None) => ComponentRef::new(MetadataType::ValidationRule, id),
            (None, Some(id), None) => ComponentRef::new(MetadataType::WorkflowRule, id),
            (None, None, Some(id)) => ComponentRef::new(MetadataType::Trigger, id),
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "deploy job component {} must reference exactly one record",
                    entity.id
                )))
            }
        };

        Ok(DeployJobComponent {
            id: entity.id,
            deploy_job_id: entity.deploy_job_id,
            component,
            enable: entity.enable,
        })
    }
}
