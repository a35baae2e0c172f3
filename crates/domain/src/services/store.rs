//! Storage seam for jobs, metadata records and deploy jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{
    ApexTrigger, ComponentRef, CredentialContext, DeployJob, DeployJobComponent, InFlightIds, Job,
    JobStatus, MetadataRecord, MetadataSnapshot, MetadataType, NewDeployJobComponent, ValidationRule,
    WorkflowRule,
};

/// Durable storage used by the request handlers and the background tasks.
///
/// Status changes go through the compare-and-set `transition_*` and
/// `complete_*` methods: they only apply when the stored status still equals
/// the expected one and report whether they did. A `from -> to` pair outside
/// the job lifecycle is refused with `StoreError::IllegalTransition` before
/// the record is read.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Cheap connectivity check for health probes.
    async fn ping(&self) -> Result<(), StoreError>;

    // ---- fetch jobs ----

    /// Persists a new job in `NotStarted` status.
    async fn create_job(
        &self,
        random_id: &str,
        credentials: &CredentialContext,
    ) -> Result<Job, StoreError>;

    async fn find_job(&self, job_id: i64) -> Result<Option<Job>, StoreError>;

    async fn find_job_by_random_id(&self, random_id: &str) -> Result<Option<Job>, StoreError>;

    async fn transition_job(
        &self,
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Inserts the snapshot and moves the job `Running → Finished` atomically.
    ///
    /// Returns `false` and writes nothing if the job is no longer running.
    async fn complete_fetch_job(
        &self,
        job_id: i64,
        snapshot: &MetadataSnapshot,
    ) -> Result<bool, StoreError>;

    // ---- metadata records ----

    async fn list_validation_rules(&self, job_id: i64) -> Result<Vec<ValidationRule>, StoreError>;

    async fn list_workflow_rules(&self, job_id: i64) -> Result<Vec<WorkflowRule>, StoreError>;

    async fn list_triggers(&self, job_id: i64) -> Result<Vec<ApexTrigger>, StoreError>;

    /// Looks up a record, scoped to the job that fetched it.
    async fn find_component(
        &self,
        job_id: i64,
        component: ComponentRef,
    ) -> Result<Option<MetadataRecord>, StoreError>;

    // ---- deploy jobs ----

    /// Persists a new deploy job in `NotStarted` status.
    async fn create_deploy_job(
        &self,
        job_id: i64,
        metadata_type: MetadataType,
    ) -> Result<DeployJob, StoreError>;

    async fn find_deploy_job(&self, deploy_job_id: i64) -> Result<Option<DeployJob>, StoreError>;

    async fn add_deploy_components(
        &self,
        deploy_job_id: i64,
        components: &[NewDeployJobComponent],
    ) -> Result<Vec<DeployJobComponent>, StoreError>;

    async fn list_deploy_components(
        &self,
        deploy_job_id: i64,
    ) -> Result<Vec<DeployJobComponent>, StoreError>;

    async fn transition_deploy_job(
        &self,
        deploy_job_id: i64,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Applies each component's requested state to its record and moves the
    /// deploy job `Running → Finished` atomically.
    ///
    /// Returns `false` and writes nothing if the deploy job is no longer running.
    async fn complete_deploy_job(
        &self,
        deploy_job_id: i64,
        components: &[DeployJobComponent],
    ) -> Result<bool, StoreError>;

    // ---- maintenance ----

    /// Moves jobs and deploy jobs that have sat in `NotStarted` or `Running`
    /// since before `updated_before` to `Error`, skipping the `in_flight`
    /// ids. Returns the number affected.
    async fn fail_stale_jobs(
        &self,
        updated_before: DateTime<Utc>,
        message: &str,
        in_flight: &InFlightIds,
    ) -> Result<u64, StoreError>;

    /// Deletes jobs created before `cutoff` together with everything they own.
    async fn purge_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
