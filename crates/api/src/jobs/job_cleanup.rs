//! Retention cleanup of old jobs.
//!
//! Deleting a job removes its metadata records, deploy jobs and the access
//! token stored with it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::services::JobStore;
use tracing::info;

use super::scheduler::{JobFrequency, PeriodicJob};

pub struct ExpiredJobCleanupJob {
    store: Arc<dyn JobStore>,
    retention_days: u32,
}

impl ExpiredJobCleanupJob {
    /// `retention_days == 0` keeps jobs forever.
    pub fn new(store: Arc<dyn JobStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.retention_days > 0
    }

    pub async fn cleanup(&self) -> Result<u64, String> {
        if !self.is_enabled() {
            return Ok(0);
        }

        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let deleted = self
            .store
            .purge_jobs_before(cutoff)
            .await
            .map_err(|e| format!("Failed to purge expired jobs: {}", e))?;

        info!(
            deleted = deleted,
            retention_days = self.retention_days,
            "Purged expired jobs"
        );
        Ok(deleted)
    }
}

#[async_trait::async_trait]
impl PeriodicJob for ExpiredJobCleanupJob {
    fn name(&self) -> &'static str {
        "expired_job_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> Result<(), String> {
        self.cleanup().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::credentials;
    use persistence::InMemoryJobStore;

    #[tokio::test]
    async fn test_recent_jobs_are_kept() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.create_job("recent", &credentials()).await.unwrap();

        let cleanup = ExpiredJobCleanupJob::new(store.clone(), 30);
        assert_eq!(cleanup.cleanup().await.unwrap(), 0);
        assert!(store.find_job(job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_retention_disables_cleanup() {
        let store = Arc::new(InMemoryJobStore::new());
        store.create_job("kept", &credentials()).await.unwrap();

        let cleanup = ExpiredJobCleanupJob::new(store.clone(), 0);
        assert!(!cleanup.is_enabled());
        assert_eq!(cleanup.cleanup().await.unwrap(), 0);
        assert!(store.find_job_by_random_id("kept").await.unwrap().is_some());
    }

    #[test]
    fn test_runs_hourly() {
        let cleanup = ExpiredJobCleanupJob::new(Arc::new(InMemoryJobStore::new()), 30);
        assert_eq!(cleanup.name(), "expired_job_cleanup");
        assert_eq!(cleanup.frequency(), JobFrequency::Hourly);
    }
}
