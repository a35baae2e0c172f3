//! Deploy job repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::{JobStatus, MetadataType, NewDeployJobComponent};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::entities::{DeployJobComponentEntity, DeployJobEntity};
use crate::metrics::QueryTimer;

/// Repository for deploy jobs and their components.
#[derive(Clone)]
pub struct DeployJobRepository {
    pool: PgPool,
}

impl DeployJobRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a deploy job in `Not Started` status.
    pub async fn create(
        &self,
        job_id: i64,
        metadata_type: MetadataType,
    ) -> Result<DeployJobEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_deploy_job");
        let result = sqlx::query_as::<_, DeployJobEntity>(
            r#"
            INSERT INTO deploy_jobs (job_id, status, metadata_type)
            VALUES ($1, $2, $3)
            RETURNING id, job_id, status, error, metadata_type, created_date, updated_at
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::NotStarted.as_str())
        .bind(metadata_type.as_str())
        .fetch_one(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Find deploy job by id.
    pub async fn find_by_id(
        &self,
        deploy_job_id: i64,
    ) -> Result<Option<DeployJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_deploy_job_by_id");
        let result = sqlx::query_as::<_, DeployJobEntity>(
            r#"
            SELECT id, job_id, status, error, metadata_type, created_date, updated_at
            FROM deploy_jobs
            WHERE id = $1
            "#,
        )
        .bind(deploy_job_id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Insert the components of a deploy job in one statement.
    pub async fn add_components(
        &self,
        deploy_job_id: i64,
        components: &[NewDeployJobComponent],
    ) -> Result<Vec<DeployJobComponentEntity>, sqlx::Error> {
        if components.is_empty() {
            return Ok(Vec::new());
        }

        let timer = QueryTimer::new("add_deploy_job_components");
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO deploy_job_components \
             (deploy_job_id, validation_rule_id, workflow_rule_id, trigger_id, enable) ",
        );
        builder.push_values(components, |mut row, component| {
            let (validation_rule_id, workflow_rule_id, trigger_id) =
                DeployJobComponentEntity::columns(component.component);
            row.push_bind(deploy_job_id)
                .push_bind(validation_rule_id)
                .push_bind(workflow_rule_id)
                .push_bind(trigger_id)
                .push_bind(component.enable);
        });
        builder.push(
            " RETURNING id, deploy_job_id, validation_rule_id, workflow_rule_id, trigger_id, enable",
        );

        let result = builder
            .build_query_as::<DeployJobComponentEntity>()
            .fetch_all(&self.pool)
            .await;
        timer.finish(result)
    }

    /// List the components of a deploy job in insertion order.
    pub async fn list_components(
        &self,
        deploy_job_id: i64,
    ) -> Result<Vec<DeployJobComponentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_deploy_job_components");
        let result = sqlx::query_as::<_, DeployJobComponentEntity>(
            r#"
            SELECT id, deploy_job_id, validation_rule_id, workflow_rule_id, trigger_id, enable
            FROM deploy_job_components
            WHERE deploy_job_id = $1
            ORDER BY id
            "#,
        )
        .bind(deploy_job_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Compare-and-set status change. Returns false if the deploy job was not in `from`.
    pub async fn transition(
        conn: &mut PgConnection,
        deploy_job_id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("transition_deploy_job");
        let result = sqlx::query(
            r#"
            UPDATE deploy_jobs
            SET status = $3, error = $4, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(deploy_job_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(error)
        .execute(conn)
        .await;

        Ok(timer.finish(result)?.rows_affected() > 0)
    }

    /// Move deploy jobs idle in a non-terminal state since before `updated_before` to `Error`.
    pub async fn fail_stale(
        conn: &mut PgConnection,
        updated_before: DateTime<Utc>,
        message: &str,
        skip_ids: &[i64],
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("fail_stale_deploy_jobs");
        let result = sqlx::query(
            r#"
            UPDATE deploy_jobs
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
}
