//! Deploy jobs and the component selections they push to an org.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::job::{JobStatus, StatusResponse};
use super::metadata::MetadataType;
use crate::error::SyncError;

/// A request to switch a set of components of one type on or off.
#[derive(Debug, Clone)]
pub struct DeployJob {
    pub id: i64,
    pub job_id: i64,
    pub status: JobStatus,
    pub error: Option<String>,
    pub metadata_type: MetadataType,
    pub created_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeployJob {
    pub fn status_response(&self) -> StatusResponse {
        StatusResponse::new(self.status, self.error.clone())
    }
}

/// Reference to exactly one stored metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ComponentRef {
    ValidationRule(i64),
    WorkflowRule(i64),
    Trigger(i64),
}

impl ComponentRef {
    pub fn new(metadata_type: MetadataType, id: i64) -> Self {
        match metadata_type {
            MetadataType::ValidationRule => ComponentRef::ValidationRule(id),
            MetadataType::WorkflowRule => ComponentRef::WorkflowRule(id),
            MetadataType::Trigger => ComponentRef::Trigger(id),
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ComponentRef::ValidationRule(id)
            | ComponentRef::WorkflowRule(id)
            | ComponentRef::Trigger(id) => *id,
        }
    }

    pub fn metadata_type(&self) -> MetadataType {
        match self {
            ComponentRef::ValidationRule(_) => MetadataType::ValidationRule,
            ComponentRef::WorkflowRule(_) => MetadataType::WorkflowRule,
            ComponentRef::Trigger(_) => MetadataType::Trigger,
        }
    }
}

/// A component of a deploy job with the state it should end up in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployJobComponent {
    pub id: i64,
    pub deploy_job_id: i64,
    pub component: ComponentRef,
    pub enable: bool,
}

/// Component row to insert for a new deploy job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewDeployJobComponent {
    pub component: ComponentRef,
    pub enable: bool,
}

/// One entry of the client's component selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ComponentSelection {
    #[serde(deserialize_with = "deserialize_component_id")]
    pub component_id: i64,
    pub enable: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawComponentId {
    Number(i64),
    Text(String),
}

fn deserialize_component_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match RawComponentId::deserialize(deserializer)? {
        RawComponentId::Number(id) => Ok(id),
        RawComponentId::Text(text) => text.trim().parse::<i64>().map_err(|_| {
            serde::de::Error::custom(format!("component_id '{}' is not an integer", text))
        }),
    }
}

/// Parses the raw selection payload submitted with a deploy request.
///
/// The payload must be a non-empty JSON array of
/// `{"component_id": <int or numeric string>, "enable": <bool>}` with no
/// repeated component ids.
pub fn parse_component_selection(raw: &[u8]) -> Result<Vec<ComponentSelection>, SyncError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| SyncError::MalformedRequest("components payload is not UTF-8".into()))?;

    if text.trim().is_empty() {
        return Err(SyncError::MalformedRequest(
            "components payload is empty".into(),
        ));
    }

    let selection: Vec<ComponentSelection> = serde_json::from_str(text)
        .map_err(|e| SyncError::MalformedRequest(format!("invalid components payload: {}", e)))?;

    if selection.is_empty() {
        return Err(SyncError::MalformedRequest(
            "no components selected for deployment".into(),
        ));
    }

    let mut seen = HashSet::with_capacity(selection.len());
    for item in &selection {
        if !seen.insert(item.component_id) {
            return Err(SyncError::MalformedRequest(format!(
                "component {} selected more than once",
                item.component_id
            )));
        }
    }

    Ok(selection)
}

/// Response returned when a deploy job is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeployJobResponse {
    pub deploy_job_id: i64,
    pub status: JobStatus,
    pub status_url: String,
}

impl CreateDeployJobResponse {
    pub fn from_deploy_job(deploy_job: &DeployJob) -> Self {
        Self {
            deploy_job_id: deploy_job.id,
            status: deploy_job.status,
            status_url: format!("/api/v1/deploy-jobs/{}/status", deploy_job.id),
        }
    }
}

/// Detail view of a deploy job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployJobResponse {
    pub deploy_job_id: i64,
    pub metadata_type: MetadataType,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_date: DateTime<Utc>,
    pub components: Vec<DeployJobComponent>,
}

impl DeployJobResponse {
    pub fn new(deploy_job: DeployJob, components: Vec<DeployJobComponent>) -> Self {
        let status = deploy_job.status_response();
        Self {
            deploy_job_id: deploy_job.id,
            metadata_type: deploy_job.metadata_type,
            status: status.status,
            error: status.error,
            created_date: deploy_job.created_date,
            components,
        }
    }
}
