//! Fetch job repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::{CredentialContext, JobStatus};
use sqlx::{PgConnection, PgPool};

use crate::entities::JobEntity;
use crate::metrics::QueryTimer;

const JOB_COLUMNS: &str = "id, random_id, created_date, updated_at, status, error, \
                           username, org_id, org_name, instance_url, access_token";

/// Repository for fetch job database operations.
#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new job in `Not Started` status.
    pub async fn create(
        &self,
        random_id: &str,
        credentials: &CredentialContext,
    ) -> Result<JobEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_job");
        let result = sqlx::query_as::<_, JobEntity>(&format!(
            r#"
            INSERT INTO jobs (random_id, status, username, org_id, org_name, instance_url, access_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(random_id)
        .bind(JobStatus::NotStarted.as_str())
        .bind(&credentials.username)
        .bind(&credentials.org_id)
        .bind(&credentials.org_name)
        .bind(&credentials.instance_url)
        .bind(&credentials.access_token)
        .fetch_one(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Find job by internal id.
    pub async fn find_by_id(&self, job_id: i64) -> Result<Option<JobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_job_by_id");
        let result = sqlx::query_as::<_, JobEntity>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Find job by the token handed to clients.
    pub async fn find_by_random_id(
        &self,
        random_id: &str,
    ) -> Result<Option<JobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_job_by_random_id");
        let result = sqlx::query_as::<_, JobEntity>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE random_id = $1"
        ))
        .bind(random_id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Compare-and-set status change. Returns false if the job was not in `from`.
    pub async fn transition(
        conn: &mut PgConnection,
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("transition_job");
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $3, error = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(job_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(error)
        .execute(conn)
        .await;

        Ok(timer.finish(result)?.rows_affected() > 0)
    }

    /// Move jobs idle in a non-terminal state since before `updated_before` to `Error`.
    pub async fn fail_stale(
        conn: &mut PgConnection,
        updated_before: DateTime<Utc>,
        message: &str,
        skip_ids: &[i64],
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("fail_stale_jobs");
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, error = $3, updated_at = NOW()
            WHERE status IN ($4, $5) AND updated_at < $1 AND NOT (id = ANY($6))
            "#,
        )
        .bind(updated_before)
        .bind(JobStatus::Error.as_str())
        .bind(message)
        .bind(JobStatus::NotStarted.as_str())
        .bind(JobStatus::Running.as_str())
        .bind(skip_ids)
        .execute(conn)
        .await;

        Ok(timer.finish(result)?.rows_affected())
    }

    /// Delete jobs created before `cutoff`; owned rows go with them by cascade.
    pub async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_jobs_created_before");
        let result = sqlx::query("DELETE FROM jobs WHERE created_date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await;

        Ok(timer.finish(result)?.rows_affected())
    }
}
