//! Fails jobs and deploy jobs that stopped making progress.
//!
//! A task lost to a restart would otherwise leave its job in
//! `Not Started`/`Running` forever. Records the queue still holds are never
//! swept, however long they wait for a worker.

use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::services::JobStore;
use tracing::{debug, warn};

use super::queue::InFlight;
use super::scheduler::{JobFrequency, PeriodicJob};
use crate::config::MAX_STALE_JOB_MINUTES;
use crate::middleware::metrics::record_stale_jobs_failed;

pub const STALE_JOB_MESSAGE: &str = "Job timed out before completing";

pub struct StaleJobSweepJob {
    store: Arc<dyn JobStore>,
    in_flight: InFlight,
    stale_after: Duration,
    interval_secs: u64,
}

impl StaleJobSweepJob {
    pub fn new(
        store: Arc<dyn JobStore>,
        in_flight: InFlight,
        stale_after_minutes: u64,
        interval_secs: u64,
    ) -> Self {
        Self {
            store,
            in_flight,
            stale_after: Duration::minutes(stale_after_minutes.min(MAX_STALE_JOB_MINUTES) as i64),
            interval_secs,
        }
    }

    /// Runs one sweep and returns how many records were failed.
    pub async fn sweep(&self) -> Result<u64, String> {
        let cutoff = Utc::now()
            .checked_sub_signed(self.stale_after)
            .ok_or_else(|| format!("stale threshold {} is out of range", self.stale_after))?;
        let failed = self
            .store
            .fail_stale_jobs(cutoff, STALE_JOB_MESSAGE, &self.in_flight.ids())
            .await
            .map_err(|e| format!("Failed to sweep stale jobs: {}", e))?;

        if failed > 0 {
            warn!(failed, cutoff = %cutoff, "Failed stale jobs");
            record_stale_jobs_failed(failed);
        } else {
            debug!("No stale jobs");
        }
        Ok(failed)
    }
}

#[async_trait::async_trait]
impl PeriodicJob for StaleJobSweepJob {
    fn name(&self) -> &'static str {
        "stale_job_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        self.sweep().await.map(|_| ())
    }
}
