//! Deploy task: pushes activation changes for a deploy job to the org.

use std::sync::Arc;
use std::time::Instant;

use domain::models::{DeployJobComponent, JobStatus, MetadataChange};
use domain::services::{JobStore, MetadataApi};
use domain::SyncError;
use tracing::{error, info, instrument, warn};

use super::retry::RetryPolicy;
use crate::middleware::metrics::record_task_outcome;

pub struct DeployService {
    store: Arc<dyn JobStore>,
    api: Arc<dyn MetadataApi>,
    retry: RetryPolicy,
}

impl DeployService {
    pub fn new(store: Arc<dyn JobStore>, api: Arc<dyn MetadataApi>, retry: RetryPolicy) -> Self {
        Self { store, api, retry }
    }

    /// Runs the deploy job. Every failure ends up on the deploy job itself.
    #[instrument(skip(self))]
    pub async fn run(&self, deploy_job_id: i64) {
        let start = Instant::now();
        let outcome = match self.execute(deploy_job_id).await {
            Ok(true) => "finished",
            Ok(false) => "skipped",
            Err(err) => {
                self.fail(deploy_job_id, &err).await;
                "error"
            }
        };
        record_task_outcome("deploy", outcome, start.elapsed());
    }

    async fn execute(&self, deploy_job_id: i64) -> Result<bool, SyncError> {
        if !self
            .store
            .transition_deploy_job(
                deploy_job_id,
                JobStatus::NotStarted,
                JobStatus::Running,
                None,
            )
            .await?
        {
            info!("Deploy job already claimed or no longer pending, skipping");
            return Ok(false);
        }

        let deploy_job = self
            .store
            .find_deploy_job(deploy_job_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("deploy job {}", deploy_job_id)))?;
        let job = self
            .store
            .find_job(deploy_job.job_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("job {}", deploy_job.job_id)))?;
        let components = self.store.list_deploy_components(deploy_job_id).await?;
        if components.is_empty() {
            return Err(SyncError::MalformedRequest(
                "deploy job has no components".into(),
            ));
        }

        let changes = self.build_changes(job.id, &components).await?;
        let credentials = job.credentials();
        info!(
            org_id = %credentials.org_id,
            token_fingerprint = %credentials.token_fingerprint(),
            metadata_type = %deploy_job.metadata_type,
            components = changes.len(),
            "Deploying metadata changes"
        );

        self.retry
            .run("deploy", || self.api.deploy(&credentials, &changes))
            .await?;

        let applied = self
            .store
            .complete_deploy_job(deploy_job_id, &components)
            .await?;
        if applied {
            info!("Deploy finished");
        } else {
            warn!("Deploy job left Running before local records were updated");
        }
        Ok(applied)
    }

    /// Resolves each component to its record within `job_id`.
    async fn build_changes(
        &self,
        job_id: i64,
        components: &[DeployJobComponent],
    ) -> Result<Vec<MetadataChange>, SyncError> {
        let mut changes = Vec::with_capacity(components.len());
        for component in components {
            let record = self
                .store
                .find_component(job_id, component.component)
                .await?
                .ok_or_else(|| {
                    SyncError::NotFound(format!(
                        "{} {} does not belong to this job",
                        component.component.metadata_type(),
                        component.component.id()
                    ))
                })?;
            changes.push(record.to_change(component.enable)?);
        }
        Ok(changes)
    }

    async fn fail(&self, deploy_job_id: i64, err: &SyncError) {
        let message = err.to_string();
        match self
            .store
            .transition_deploy_job(
                deploy_job_id,
                JobStatus::Running,
                JobStatus::Error,
                Some(&message),
            )
            .await
        {
            Ok(true) => warn!(error = %message, "Deploy failed"),
            Ok(false) => warn!(
                error = %message,
                "Deploy failed but the deploy job was no longer running"
            ),
            Err(store_err) => error!(
                error = %message,
                store_error = %store_err,
                "Failed to record deploy failure"
            ),
        }
    }
}
