//! Automation metadata fetched from an org.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::str::FromStr;

use super::deploy_job::ComponentRef;
use crate::error::SyncError;

/// Kind of automation component a deploy job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataType {
    ValidationRule,
    WorkflowRule,
    Trigger,
}

impl MetadataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataType::ValidationRule => "validation_rule",
            MetadataType::WorkflowRule => "workflow_rule",
            MetadataType::Trigger => "trigger",
        }
    }

    /// Tooling API sObject name for this kind of component.
    pub fn sobject_name(&self) -> &'static str {
        match self {
            MetadataType::ValidationRule => "ValidationRule",
            MetadataType::WorkflowRule => "WorkflowRule",
            MetadataType::Trigger => "ApexTrigger",
        }
    }
}

impl std::fmt::Display for MetadataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation_rule" => Ok(MetadataType::ValidationRule),
            "workflow_rule" => Ok(MetadataType::WorkflowRule),
            "trigger" => Ok(MetadataType::Trigger),
            _ => Err(format!("Unknown metadata type: {}", s)),
        }
    }
}

/// Validation rule as fetched from the org.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewValidationRule {
    pub remote_id: String,
    pub object_name: String,
    pub name: String,
    pub full_name: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub error_condition_formula: Option<String>,
    pub error_message: Option<String>,
    pub error_display_field: Option<String>,
    pub metadata: JsonValue,
}

/// Persisted validation rule owned by a fetch job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    pub id: i64,
    pub job_id: i64,
    pub remote_id: String,
    pub object_name: String,
    pub name: String,
    pub full_name: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub error_condition_formula: Option<String>,
    pub error_message: Option<String>,
    pub error_display_field: Option<String>,
    pub metadata: JsonValue,
}

/// Workflow rule as fetched from the org.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkflowRule {
    pub remote_id: String,
    pub object_name: String,
    pub name: String,
    pub full_name: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub formula: Option<String>,
    pub trigger_type: Option<String>,
    pub metadata: JsonValue,
}

/// Persisted workflow rule owned by a fetch job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRule {
    pub id: i64,
    pub job_id: i64,
    pub remote_id: String,
    pub object_name: String,
    pub name: String,
    pub full_name: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub formula: Option<String>,
    pub trigger_type: Option<String>,
    pub metadata: JsonValue,
}

/// Apex trigger as fetched from the org.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApexTrigger {
    pub remote_id: String,
    pub name: String,
    pub object_name: String,
    pub enabled: bool,
    pub api_version: String,
    pub metadata: JsonValue,
}

/// Persisted Apex trigger owned by a fetch job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApexTrigger {
    pub id: i64,
    pub job_id: i64,
    pub remote_id: String,
    pub name: String,
    pub object_name: String,
    pub enabled: bool,
    pub api_version: String,
    pub metadata: JsonValue,
}

/// Everything one fetch retrieved, written in a single batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataSnapshot {
    pub validation_rules: Vec<NewValidationRule>,
    pub workflow_rules: Vec<NewWorkflowRule>,
    pub triggers: Vec<NewApexTrigger>,
}

impl MetadataSnapshot {
    pub fn len(&self) -> usize {
        self.validation_rules.len() + self.workflow_rules.len() + self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A stored record of any of the three metadata kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataRecord {
    ValidationRule(ValidationRule),
    WorkflowRule(WorkflowRule),
    Trigger(ApexTrigger),
}

impl MetadataRecord {
    pub fn metadata_type(&self) -> MetadataType {
        match self {
            MetadataRecord::ValidationRule(_) => MetadataType::ValidationRule,
            MetadataRecord::WorkflowRule(_) => MetadataType::WorkflowRule,
            MetadataRecord::Trigger(_) => MetadataType::Trigger,
        }
    }

    pub fn component_ref(&self) -> ComponentRef {
        match self {
            MetadataRecord::ValidationRule(r) => ComponentRef::ValidationRule(r.id),
            MetadataRecord::WorkflowRule(r) => ComponentRef::WorkflowRule(r.id),
            MetadataRecord::Trigger(t) => ComponentRef::Trigger(t.id),
        }
    }

    pub fn job_id(&self) -> i64 {
        match self {
            MetadataRecord::ValidationRule(r) => r.job_id,
            MetadataRecord::WorkflowRule(r) => r.job_id,
            MetadataRecord::Trigger(t) => t.job_id,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            MetadataRecord::ValidationRule(r) => r.enabled,
            MetadataRecord::WorkflowRule(r) => r.enabled,
            MetadataRecord::Trigger(t) => t.enabled,
        }
    }

    /// Builds the deploy payload that switches this component on or off.
    ///
    /// The stored definition is resubmitted as-is apart from the activation
    /// flag: `active` for rules, `status` for triggers.
    pub fn to_change(&self, enable: bool) -> Result<MetadataChange, SyncError> {
        let (remote_id, full_name, stored) = match self {
            MetadataRecord::ValidationRule(r) => (&r.remote_id, &r.full_name, &r.metadata),
            MetadataRecord::WorkflowRule(r) => (&r.remote_id, &r.full_name, &r.metadata),
            MetadataRecord::Trigger(t) => (&t.remote_id, &t.name, &t.metadata),
        };

        let mut metadata = match stored {
            JsonValue::Object(map) => map.clone(),
            _ => {
                return Err(SyncError::MalformedRequest(format!(
                    "stored definition of {} {} is not an object",
                    self.metadata_type(),
                    full_name
                )))
            }
        };

        match self {
            MetadataRecord::Trigger(_) => {
                let status = if enable { "Active" } else { "Inactive" };
                metadata.insert("status".to_string(), JsonValue::from(status));
            }
            _ => {
                metadata.insert("active".to_string(), JsonValue::Bool(enable));
            }
        }

        Ok(MetadataChange {
            metadata_type: self.metadata_type(),
            remote_id: remote_id.clone(),
            full_name: full_name.clone(),
            metadata: JsonValue::Object(metadata),
        })
    }
}

/// One component update submitted to the org's deployment API.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataChange {
    pub metadata_type: MetadataType,
    pub remote_id: String,
    pub full_name: String,
    pub metadata: JsonValue,
}

/// Sorted, de-duplicated object names; used to group rules per object.
pub fn unique_object_names<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
