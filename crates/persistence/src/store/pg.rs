//! PostgreSQL-backed job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{
    ApexTrigger, ComponentRef, CredentialContext, DeployJob, DeployJobComponent, InFlightIds, Job,
    JobStatus, MetadataRecord, MetadataSnapshot, MetadataType, NewDeployJobComponent, ValidationRule,
    WorkflowRule,
};
use domain::services::JobStore;
use domain::StoreError;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::repositories::{DeployJobRepository, JobRepository, MetadataRepository};

/// SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Maps driver errors onto the store error taxonomy.
fn db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(err.to_string())
}

/// `JobStore` over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
    jobs: JobRepository,
    metadata: MetadataRepository,
    deploy_jobs: DeployJobRepository,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            jobs: JobRepository::new(pool.clone()),
            metadata: MetadataRepository::new(pool.clone()),
            deploy_jobs: DeployJobRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn create_job(
        &self,
        random_id: &str,
        credentials: &CredentialContext,
    ) -> Result<Job, StoreError> {
        let entity = self
            .jobs
            .create(random_id, credentials)
            .await
            .map_err(db_err)?;
        Job::try_from(entity)
    }

    async fn find_job(&self, job_id: i64) -> Result<Option<Job>, StoreError> {
        self.jobs
            .find_by_id(job_id)
            .await
            .map_err(db_err)?
            .map(Job::try_from)
            .transpose()
    }

    async fn find_job_by_random_id(&self, random_id: &str) -> Result<Option<Job>, StoreError> {
        self.jobs
            .find_by_random_id(random_id)
            .await
            .map_err(db_err)?
            .map(Job::try_from)
            .transpose()
    }

    async fn transition_job(
        &self,
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        from.ensure_transition(to)?;
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        JobRepository::transition(&mut conn, job_id, from, to, error)
            .await
            .map_err(db_err)
    }

    async fn complete_fetch_job(
        &self,
        job_id: i64,
        snapshot: &MetadataSnapshot,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // The status update locks the job row, so a concurrent sweep either
        // wins before us or waits for the commit.
        let claimed = JobRepository::transition(
            &mut tx,
            job_id,
            JobStatus::Running,
            JobStatus::Finished,
            None,
        )
        .await
        .map_err(db_err)?;

        if !claimed {
            tx.rollback().await.map_err(db_err)?;
            warn!(job_id, "Job left Running before its snapshot was stored");
            return Ok(false);
        }

        let inserted = MetadataRepository::insert_snapshot(&mut tx, job_id, snapshot)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        debug!(job_id, inserted, "Stored metadata snapshot");
        Ok(true)
    }

    async fn list_validation_rules(&self, job_id: i64) -> Result<Vec<ValidationRule>, StoreError> {
        let entities = self
            .metadata
            .list_validation_rules(job_id)
            .await
            .map_err(db_err)?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn list_workflow_rules(&self, job_id: i64) -> Result<Vec<WorkflowRule>, StoreError> {
        let entities = self
            .metadata
            .list_workflow_rules(job_id)
            .await
            .map_err(db_err)?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn list_triggers(&self, job_id: i64) -> Result<Vec<ApexTrigger>, StoreError> {
        let entities = self.metadata.list_triggers(job_id).await.map_err(db_err)?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn find_component(
        &self,
        job_id: i64,
        component: ComponentRef,
    ) -> Result<Option<MetadataRecord>, StoreError> {
        let record = match component {
            ComponentRef::ValidationRule(id) => self
                .metadata
                .find_validation_rule(job_id, id)
                .await
                .map_err(db_err)?
                .map(|e| MetadataRecord::ValidationRule(e.into())),
            ComponentRef::WorkflowRule(id) => self
                .metadata
                .find_workflow_rule(job_id, id)
                .await
                .map_err(db_err)?
                .map(|e| MetadataRecord::WorkflowRule(e.into())),
            ComponentRef::Trigger(id) => self
                .metadata
                .find_trigger(job_id, id)
                .await
                .map_err(db_err)?
                .map(|e| MetadataRecord::Trigger(e.into())),
        };
        Ok(record)
    }

    async fn create_deploy_job(
        &self,
        job_id: i64,
        metadata_type: MetadataType,
    ) -> Result<DeployJob, StoreError> {
        let entity = self
            .deploy_jobs
            .create(job_id, metadata_type)
            .await
            .map_err(db_err)?;
        DeployJob::try_from(entity)
    }

    async fn find_deploy_job(&self, deploy_job_id: i64) -> Result<Option<DeployJob>, StoreError> {
        self.deploy_jobs
            .find_by_id(deploy_job_id)
            .await
            .map_err(db_err)?
            .map(DeployJob::try_from)
            .transpose()
    }

    async fn add_deploy_components(
        &self,
        deploy_job_id: i64,
        components: &[NewDeployJobComponent],
    ) -> Result<Vec<DeployJobComponent>, StoreError> {
        self.deploy_jobs
            .add_components(deploy_job_id, components)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DeployJobComponent::try_from)
            .collect()
    }

    async fn list_deploy_components(
        &self,
        deploy_job_id: i64,
    ) -> Result<Vec<DeployJobComponent>, StoreError> {
        self.deploy_jobs
            .list_components(deploy_job_id)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DeployJobComponent::try_from)
            .collect()
    }

    async fn transition_deploy_job(
        &self,
        deploy_job_id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        from.ensure_transition(to)?;
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        DeployJobRepository::transition(&mut conn, deploy_job_id, from, to, error)
            .await
            .map_err(db_err)
    }

    async fn complete_deploy_job(
        &self,
        deploy_job_id: i64,
        components: &[DeployJobComponent],
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let claimed = DeployJobRepository::transition(
            &mut tx,
            deploy_job_id,
            JobStatus::Running,
            JobStatus::Finished,
            None,
        )
        .await
        .map_err(db_err)?;

        if !claimed {
            tx.rollback().await.map_err(db_err)?;
            warn!(deploy_job_id, "Deploy job left Running before completion");
            return Ok(false);
        }

        for component in components {
            let updated =
                MetadataRepository::set_enabled(&mut tx, component.component, component.enable)
                    .await
                    .map_err(db_err)?;
            if !updated {
                tx.rollback().await.map_err(db_err)?;
                return Err(StoreError::Corrupt(format!(
                    "{} {} referenced by deploy job {} no longer exists",
                    component.component.metadata_type(),
                    component.component.id(),
                    deploy_job_id
                )));
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn fail_stale_jobs(
        &self,
        updated_before: DateTime<Utc>,
        message: &str,
        in_flight: &InFlightIds,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let jobs = JobRepository::fail_stale(&mut tx, updated_before, message, &in_flight.jobs)
            .await
            .map_err(db_err)?;
        let deploy_jobs = DeployJobRepository::fail_stale(
            &mut tx,
            updated_before,
            message,
            &in_flight.deploy_jobs,
        )
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        Ok(jobs + deploy_jobs)
    }

    async fn purge_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.jobs.delete_created_before(cutoff).await.map_err(db_err)
    }
}
