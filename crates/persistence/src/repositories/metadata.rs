//! Repository for the metadata records a fetch job retrieves.

use domain::models::{ComponentRef, MetadataSnapshot};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::entities::{ApexTriggerEntity, ValidationRuleEntity, WorkflowRuleEntity};
use crate::metrics::QueryTimer;

/// Rows per multi-row INSERT; keeps every statement well under the
/// PostgreSQL bind parameter limit.
const INSERT_CHUNK_SIZE: usize = 1000;

/// Repository for validation rule, workflow rule and Apex trigger records.
#[derive(Clone)]
pub struct MetadataRepository {
    pool: PgPool,
}

impl MetadataRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert every record of a snapshot for the given job.
    pub async fn insert_snapshot(
        conn: &mut PgConnection,
        job_id: i64,
        snapshot: &MetadataSnapshot,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("insert_metadata_snapshot");
        let result = Self::insert_all(conn, job_id, snapshot).await;
        timer.finish(result)
    }

    async fn insert_all(
        conn: &mut PgConnection,
        job_id: i64,
        snapshot: &MetadataSnapshot,
    ) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;

        for chunk in snapshot.validation_rules.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO validation_rules (job_id, remote_id, object_name, name, full_name, \
                 enabled, description, error_condition_formula, error_message, \
                 error_display_field, metadata) ",
            );
            builder.push_values(chunk, |mut row, rule| {
                row.push_bind(job_id)
                    .push_bind(&rule.remote_id)
                    .push_bind(&rule.object_name)
                    .push_bind(&rule.name)
                    .push_bind(&rule.full_name)
                    .push_bind(rule.enabled)
                    .push_bind(&rule.description)
                    .push_bind(&rule.error_condition_formula)
                    .push_bind(&rule.error_message)
                    .push_bind(&rule.error_display_field)
                    .push_bind(&rule.metadata);
            });
            inserted += builder.build().execute(&mut *conn).await?.rows_affected();
        }

        for chunk in snapshot.workflow_rules.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO workflow_rules (job_id, remote_id, object_name, name, full_name, \
                 enabled, description, formula, trigger_type, metadata) ",
            );
            builder.push_values(chunk, |mut row, rule| {
                row.push_bind(job_id)
                    .push_bind(&rule.remote_id)
                    .push_bind(&rule.object_name)
                    .push_bind(&rule.name)
                    .push_bind(&rule.full_name)
                    .push_bind(rule.enabled)
                    .push_bind(&rule.description)
                    .push_bind(&rule.formula)
                    .push_bind(&rule.trigger_type)
                    .push_bind(&rule.metadata);
            });
            inserted += builder.build().execute(&mut *conn).await?.rows_affected();
        }

        for chunk in snapshot.triggers.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO apex_triggers (job_id, remote_id, name, object_name, enabled, \
                 api_version, metadata) ",
            );
            builder.push_values(chunk, |mut row, trigger| {
                row.push_bind(job_id)
                    .push_bind(&trigger.remote_id)
                    .push_bind(&trigger.name)
                    .push_bind(&trigger.object_name)
                    .push_bind(trigger.enabled)
                    .push_bind(&trigger.api_version)
                    .push_bind(&trigger.metadata);
            });
            inserted += builder.build().execute(&mut *conn).await?.rows_affected();
        }

        Ok(inserted)
    }

    /// List validation rules of a job, grouped by object.
    pub async fn list_validation_rules(
        &self,
        job_id: i64,
    ) -> Result<Vec<ValidationRuleEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_validation_rules");
        let result = sqlx::query_as::<_, ValidationRuleEntity>(
            r#"
            SELECT id, job_id, remote_id, object_name, name, full_name, enabled, description,
                   error_condition_formula, error_message, error_display_field, metadata
            FROM validation_rules
            WHERE job_id = $1
            ORDER BY object_name, name, id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(result)
    }

    /// List workflow rules of a job, grouped by object.
    pub async fn list_workflow_rules(
        &self,
        job_id: i64,
    ) -> Result<Vec<WorkflowRuleEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_workflow_rules");
        let result = sqlx::query_as::<_, WorkflowRuleEntity>(
            r#"
            SELECT id, job_id, remote_id, object_name, name, full_name, enabled, description,
                   formula, trigger_type, metadata
            FROM workflow_rules
            WHERE job_id = $1
            ORDER BY object_name, name, id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(result)
    }

    /// List Apex triggers of a job.
    pub async fn list_triggers(&self, job_id: i64) -> Result<Vec<ApexTriggerEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_apex_triggers");
        let result = sqlx::query_as::<_, ApexTriggerEntity>(
            r#"
            SELECT id, job_id, remote_id, name, object_name, enabled, api_version, metadata
            FROM apex_triggers
            WHERE job_id = $1
            ORDER BY name, id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Find a validation rule owned by the given job.
    pub async fn find_validation_rule(
        &self,
        job_id: i64,
        id: i64,
    ) -> Result<Option<ValidationRuleEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_validation_rule");
        let result = sqlx::query_as::<_, ValidationRuleEntity>(
            r#"
            SELECT id, job_id, remote_id, object_name, name, full_name, enabled, description,
                   error_condition_formula, error_message, error_display_field, metadata
            FROM validation_rules
            WHERE id = $1 AND job_id = $2
            "#,
        )
        .bind(id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Find a workflow rule owned by the given job.
    pub async fn find_workflow_rule(
        &self,
        job_id: i64,
        id: i64,
    ) -> Result<Option<WorkflowRuleEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_workflow_rule");
        let result = sqlx::query_as::<_, WorkflowRuleEntity>(
            r#"
            SELECT id, job_id, remote_id, object_name, name, full_name, enabled, description,
                   formula, trigger_type, metadata
            FROM workflow_rules
            WHERE id = $1 AND job_id = $2
            "#,
        )
        .bind(id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Find an Apex trigger owned by the given job.
    pub async fn find_trigger(
        &self,
        job_id: i64,
        id: i64,
    ) -> Result<Option<ApexTriggerEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_apex_trigger");
        let result = sqlx::query_as::<_, ApexTriggerEntity>(
            r#"
            SELECT id, job_id, remote_id, name, object_name, enabled, api_version, metadata
            FROM apex_triggers
            WHERE id = $1 AND job_id = $2
            "#,
        )
        .bind(id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await;
        timer.finish(result)
    }

    /// Record the activation state a deploy left a component in.
    pub async fn set_enabled(
        conn: &mut PgConnection,
        component: ComponentRef,
        enabled: bool,
    ) -> Result<bool, sqlx::Error> {
        let sql = match component {
            ComponentRef::ValidationRule(_) => {
                "UPDATE validation_rules SET enabled = $2 WHERE id = $1"
            }
            ComponentRef::WorkflowRule(_) => "UPDATE workflow_rules SET enabled = $2 WHERE id = $1",
            ComponentRef::Trigger(_) => "UPDATE apex_triggers SET enabled = $2 WHERE id = $1",
        };

        let timer = QueryTimer::new("set_component_enabled");
        let result = sqlx::query(sql)
            .bind(component.id())
            .bind(enabled)
            .execute(conn)
            .await;

        Ok(timer.finish(result)?.rows_affected() > 0)
    }
}
