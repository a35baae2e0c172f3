//! Fetch job model and the status state machine shared with deploy jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::credentials::CredentialContext;
use crate::error::StoreError;
use super::metadata::{ApexTrigger, ValidationRule, WorkflowRule};

/// Lifecycle state of a fetch job or a deploy job.
///
/// `NotStarted → Running → {Finished, Error}`. `NotStarted → Error` is also
/// allowed for failures that happen before a task could start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    Running,
    Finished,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotStarted => "Not Started",
            JobStatus::Running => "Running",
            JobStatus::Finished => "Finished",
            JobStatus::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Error)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::NotStarted, JobStatus::Running)
                | (JobStatus::NotStarted, JobStatus::Error)
                | (JobStatus::Running, JobStatus::Finished)
                | (JobStatus::Running, JobStatus::Error)
        )
    }

    /// Rejects any pair outside the lifecycle before a store touches the record.
    pub fn ensure_transition(&self, next: JobStatus) -> Result<(), StoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(StoreError::IllegalTransition {
                from: *self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Not Started" => Ok(JobStatus::NotStarted),
            "Running" => Ok(JobStatus::Running),
            "Finished" => Ok(JobStatus::Finished),
            "Error" => Ok(JobStatus::Error),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Records still held by the work queue or a worker.
///
/// A stale sweep leaves these alone however old their `updated_at` is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InFlightIds {
    pub jobs: Vec<i64>,
    pub deploy_jobs: Vec<i64>,
}

/// A metadata fetch job.
///
/// `random_id` is the only handle exposed outside the service; `id` stays
/// internal.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub random_id: String,
    pub created_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: JobStatus,
    pub error: Option<String>,
    pub username: String,
    pub org_id: String,
    pub org_name: String,
    pub instance_url: String,
    pub access_token: String,
}

impl Job {
    /// Rebuilds the credentials the job was created with.
    pub fn credentials(&self) -> CredentialContext {
        CredentialContext {
            org_id: self.org_id.clone(),
            org_name: self.org_name.clone(),
            username: self.username.clone(),
            instance_url: self.instance_url.clone(),
            access_token: self.access_token.clone(),
        }
    }

    pub fn status_response(&self) -> StatusResponse {
        StatusResponse::new(self.status, self.error.clone())
    }
}

/// Polling payload for jobs and deploy jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    pub error: Option<String>,
}

impl StatusResponse {
    /// The error message is only reported for jobs in `Error` status.
    pub fn new(status: JobStatus, error: Option<String>) -> Self {
        let error = if status == JobStatus::Error {
            error.or_else(|| Some("Unknown error".to_string()))
        } else {
            None
        };
        Self { status, error }
    }
}

/// Response returned when a fetch job is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub status_url: String,
}

impl CreateJobResponse {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.random_id.clone(),
            status: job.status,
            status_url: format!("/api/v1/jobs/{}/status", job.random_id),
        }
    }
}

/// Review payload for a fetch job: the org it targets and its metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetailResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_date: DateTime<Utc>,
    pub username: String,
    pub org_id: String,
    pub org_name: String,
    pub validation_object_names: Vec<String>,
    pub validation_rules: Vec<ValidationRule>,
    pub workflow_object_names: Vec<String>,
    pub workflow_rules: Vec<WorkflowRule>,
    pub triggers: Vec<ApexTrigger>,
}
