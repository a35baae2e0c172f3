//! Error taxonomy for the fetch and deploy pipelines.

use std::time::Duration;

use thiserror::Error;

use crate::models::JobStatus;

/// Failures raised while fetching or deploying org metadata.
///
/// Inside a background task every variant ends up as the `error` message of a
/// job in `Error` status; only `NotFound` is surfaced directly to callers of
/// the status endpoints.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote API rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Deployment rejected by org: {0}")]
    Validation(String),

    #[error("Invalid response from org: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Work queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl SyncError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::RateLimited(_)
        )
    }
}

/// Persistence failures, independent of the backing store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Stored record is inconsistent: {0}")]
    Corrupt(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Storage(err.to_string())
    }
}
