//! Request-side operations on fetch jobs and deploy jobs.
//!
//! Handlers only create records and enqueue work here; the background tasks
//! own every later status change.

use std::sync::Arc;

use domain::models::{
    parse_component_selection, unique_object_names, ComponentRef, CredentialContext, DeployJob,
    DeployJobResponse, Job, JobDetailResponse, JobStatus, MetadataType, NewDeployJobComponent,
    StatusResponse,
};
use domain::services::JobStore;
use domain::{StoreError, SyncError};
use shared::crypto::generate_job_token;
use tracing::{info, warn};

use crate::jobs::{Task, TaskQueue};

/// Fresh tokens tried before giving up on a unique `random_id`.
const MAX_TOKEN_ATTEMPTS: usize = 3;

pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: TaskQueue,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, queue: TaskQueue) -> Self {
        Self { store, queue }
    }

    /// Persists a fetch job and hands it to the workers.
    ///
    /// `credentials` must already be validated. If the queue refuses the task
    /// the job is returned in `Error` status instead of staying `Not Started`.
    pub async fn create_fetch_job(&self, credentials: &CredentialContext) -> Result<Job, SyncError> {
        let mut job = self.insert_job(credentials).await?;
        info!(
            job_id = job.id,
            org_id = %credentials.org_id,
            token_fingerprint = %credentials.token_fingerprint(),
            "Fetch job created"
        );

        if let Err(err) = self.queue.enqueue(Task::Fetch { job_id: job.id }) {
            let message = err.to_string();
            if self
                .store
                .transition_job(job.id, JobStatus::NotStarted, JobStatus::Error, Some(&message))
                .await?
            {
                job.status = JobStatus::Error;
                job.error = Some(message);
            }
        }
        Ok(job)
    }

    async fn insert_job(&self, credentials: &CredentialContext) -> Result<Job, SyncError> {
        let mut attempt = 1;
        loop {
            match self
                .store
                .create_job(&generate_job_token(), credentials)
                .await
            {
                Err(StoreError::Conflict(msg)) if attempt < MAX_TOKEN_ATTEMPTS => {
                    warn!(attempt, "Job token collision: {}", msg);
                    attempt += 1;
                }
                other => return other.map_err(SyncError::from),
            }
        }
    }

    pub async fn get_job_status(&self, random_id: &str) -> Result<StatusResponse, SyncError> {
        Ok(self.find_job(random_id).await?.status_response())
    }

    /// Job summary with its metadata, grouped for review.
    pub async fn job_detail(&self, random_id: &str) -> Result<JobDetailResponse, SyncError> {
        let job = self.find_job(random_id).await?;
        let validation_rules = self.store.list_validation_rules(job.id).await?;
        let workflow_rules = self.store.list_workflow_rules(job.id).await?;
        let triggers = self.store.list_triggers(job.id).await?;
        let status = job.status_response();

        Ok(JobDetailResponse {
            validation_object_names: unique_object_names(
                validation_rules.iter().map(|r| r.object_name.as_str()),
            ),
            workflow_object_names: unique_object_names(
                workflow_rules.iter().map(|r| r.object_name.as_str()),
            ),
            job_id: job.random_id,
            status: status.status,
            error: status.error,
            created_date: job.created_date,
            username: job.username,
            org_id: job.org_id,
            org_name: job.org_name,
            validation_rules,
            workflow_rules,
            triggers,
        })
    }

    /// Persists a deploy job for `random_id` and hands it to the workers.
    ///
    /// Only an unknown job or metadata type is an error. A selection that
    /// cannot be parsed or resolved within the job yields a deploy job in
    /// `Error` status that is never enqueued.
    pub async fn create_deploy_job(
        &self,
        random_id: &str,
        metadata_type: &str,
        raw_selection: &[u8],
    ) -> Result<DeployJob, SyncError> {
        let job = self.find_job(random_id).await?;
        let metadata_type: MetadataType = metadata_type
            .parse()
            .map_err(SyncError::MalformedRequest)?;

        let mut deploy_job = self.store.create_deploy_job(job.id, metadata_type).await?;
        info!(
            job_id = job.id,
            deploy_job_id = deploy_job.id,
            %metadata_type,
            "Deploy job created"
        );

        let queued = match self.add_components(&job, &deploy_job, raw_selection).await {
            Ok(()) => self.queue.enqueue(Task::Deploy {
                deploy_job_id: deploy_job.id,
            }),
            Err(err) => Err(err),
        };

        if let Err(err) = queued {
            let message = err.to_string();
            warn!(deploy_job_id = deploy_job.id, error = %message, "Deploy job rejected");
            if self
                .store
                .transition_deploy_job(
                    deploy_job.id,
                    JobStatus::NotStarted,
                    JobStatus::Error,
                    Some(&message),
                )
                .await?
            {
                deploy_job.status = JobStatus::Error;
                deploy_job.error = Some(message);
            }
        }
        Ok(deploy_job)
    }

    /// Stores the selection after checking every component belongs to `job`.
    async fn add_components(
        &self,
        job: &Job,
        deploy_job: &DeployJob,
        raw_selection: &[u8],
    ) -> Result<(), SyncError> {
        let selection = parse_component_selection(raw_selection)?;

        let mut components = Vec::with_capacity(selection.len());
        for item in selection {
            let component = ComponentRef::new(deploy_job.metadata_type, item.component_id);
            if self.store.find_component(job.id, component).await?.is_none() {
                return Err(SyncError::NotFound(format!(
                    "{} {} does not belong to job {}",
                    deploy_job.metadata_type, item.component_id, job.random_id
                )));
            }
            components.push(NewDeployJobComponent {
                component,
                enable: item.enable,
            });
        }

        self.store
            .add_deploy_components(deploy_job.id, &components)
            .await?;
        Ok(())
    }

    pub async fn get_deploy_status(&self, deploy_job_id: i64) -> Result<StatusResponse, SyncError> {
        Ok(self.find_deploy_job(deploy_job_id).await?.status_response())
    }

    pub async fn deploy_job_detail(
        &self,
        deploy_job_id: i64,
    ) -> Result<DeployJobResponse, SyncError> {
        let deploy_job = self.find_deploy_job(deploy_job_id).await?;
        let components = self.store.list_deploy_components(deploy_job_id).await?;
        Ok(DeployJobResponse::new(deploy_job, components))
    }

    async fn find_job(&self, random_id: &str) -> Result<Job, SyncError> {
        self.store
            .find_job_by_random_id(random_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("job {}", random_id)))
    }

    async fn find_deploy_job(&self, deploy_job_id: i64) -> Result<DeployJob, SyncError> {
        self.store
            .find_deploy_job(deploy_job_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("deploy job {}", deploy_job_id)))
    }
}
