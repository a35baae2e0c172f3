//! Timeout and retry policy for remote work done by background tasks.

use std::future::Future;
use std::time::Duration;

use domain::SyncError;
use tracing::warn;

use crate::config::WorkerConfig;
use crate::middleware::metrics::record_task_retry;

/// Bounds every attempt with a timeout and retries transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub task_timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            task_timeout: config.task_timeout(),
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts. An attempt that outlives `task_timeout` counts
    /// as a `Timeout` failure.
    pub async fn run<T, F, Fut>(&self, kind: &'static str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.task_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout(self.task_timeout)),
            };

            match result {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        task = kind,
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "Retrying after transient failure"
                    );
                    record_task_retry(kind);
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                other => return other,
            }
        }
    }
}
