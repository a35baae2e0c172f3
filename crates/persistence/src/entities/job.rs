//! Fetch job entity.

use chrono::{DateTime, Utc};
use domain::models::Job;
use domain::StoreError;
use sqlx::FromRow;

/// Database entity for the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobEntity {
    pub id: i64,
    /// Opaque token handed to clients.
    pub random_id: String,
    pub created_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: String,
    pub error: Option<String>,
    pub username: String,
    pub org_id: String,
    pub org_name: String,
    pub instance_url: String,
    pub access_token: String,
}

impl TryFrom<JobEntity> for Job {
    type Error = StoreError;

    fn try_from(entity: JobEntity) -> Result<Self, Self::Error> {
        let status = entity
            .status
            .parse()
            .map_err(|e: String| StoreError::Corrupt(format!("job {}: {}", entity.id, e)))?;

        Ok(Job {
            id: entity.id,
            random_id: entity.random_id,
            created_date: entity.created_date,
            updated_at: entity.updated_at,
            status,
            error: entity.error,
            username: entity.username,
            org_id: entity.org_id,
            org_name: entity.org_name,
            instance_url: entity.instance_url,
            access_token: entity.access_token,
        })
    }
}
