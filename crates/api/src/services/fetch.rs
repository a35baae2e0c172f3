//! Metadata fetch task.

use std::sync::Arc;
use std::time::Instant;

use domain::models::{CredentialContext, JobStatus, MetadataSnapshot};
use domain::services::{JobStore, MetadataApi};
use domain::SyncError;
use tracing::{error, info, instrument, warn};

use super::retry::RetryPolicy;
use crate::middleware::metrics::record_task_outcome;

/// Pulls an org's automation metadata into the records of one job.
pub struct MetadataFetchService {
    store: Arc<dyn JobStore>,
    api: Arc<dyn MetadataApi>,
    retry: RetryPolicy,
}

impl MetadataFetchService {
    pub fn new(store: Arc<dyn JobStore>, api: Arc<dyn MetadataApi>, retry: RetryPolicy) -> Self {
        Self { store, api, retry }
    }

    /// Runs the fetch for `job_id`. Every failure ends up on the job itself.
    #[instrument(skip(self))]
    pub async fn run(&self, job_id: i64) {
        let start = Instant::now();
        let outcome = match self.execute(job_id).await {
            Ok(true) => "finished",
            Ok(false) => "skipped",
            Err(err) => {
                self.fail(job_id, &err).await;
                "error"
            }
        };
        record_task_outcome("fetch", outcome, start.elapsed());
    }

    async fn execute(&self, job_id: i64) -> Result<bool, SyncError> {
        if !self
            .store
            .transition_job(job_id, JobStatus::NotStarted, JobStatus::Running, None)
            .await?
        {
            info!("Job already claimed or no longer pending, skipping");
            return Ok(false);
        }

        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("job {}", job_id)))?;
        let credentials = job.credentials();
        info!(
            org_id = %credentials.org_id,
            token_fingerprint = %credentials.token_fingerprint(),
            "Fetching org metadata"
        );

        let snapshot = self
            .retry
            .run("fetch", || self.fetch_snapshot(&credentials))
            .await?;

        let stored = self.store.complete_fetch_job(job_id, &snapshot).await?;
        if stored {
            info!(
                validation_rules = snapshot.validation_rules.len(),
                workflow_rules = snapshot.workflow_rules.len(),
                triggers = snapshot.triggers.len(),
                "Metadata fetch finished"
            );
        } else {
            warn!("Job left Running before the snapshot was stored; discarding it");
        }
        Ok(stored)
    }

    async fn fetch_snapshot(
        &self,
        credentials: &CredentialContext,
    ) -> Result<MetadataSnapshot, SyncError> {
        let (validation_rules, workflow_rules, triggers) = tokio::try_join!(
            self.api.fetch_validation_rules(credentials),
            self.api.fetch_workflow_rules(credentials),
            self.api.fetch_triggers(credentials),
        )?;

        Ok(MetadataSnapshot {
            validation_rules,
            workflow_rules,
            triggers,
        })
    }

    async fn fail(&self, job_id: i64, err: &SyncError) {
        let message = err.to_string();
        match self
            .store
            .transition_job(job_id, JobStatus::Running, JobStatus::Error, Some(&message))
            .await
        {
            Ok(true) => warn!(error = %message, "Metadata fetch failed"),
            Ok(false) => warn!(
                error = %message,
                "Metadata fetch failed but the job was no longer running"
            ),
            Err(store_err) => error!(
                error = %message,
                store_error = %store_err,
                "Failed to record fetch failure"
            ),
        }
    }
}
