//! Metadata record entities.

use domain::models::{ApexTrigger, ValidationRule, WorkflowRule};
use serde_json::Value as JsonValue;
use sqlx::FromRow;

/// Database entity for the `validation_rules` table.
#[derive(Debug, Clone, FromRow)]
pub struct ValidationRuleEntity {
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

impl From<ValidationRuleEntity> for ValidationRule {
    fn from(e: ValidationRuleEntity) -> Self {
        ValidationRule {
            id: e.id,
            job_id: e.job_id,
            remote_id: e.remote_id,
            object_name: e.object_name,
            name: e.name,
            full_name: e.full_name,
            enabled: e.enabled,
            description: e.description,
            error_condition_formula: e.error_condition_formula,
            error_message: e.error_message,
            error_display_field: e.error_display_field,
            metadata: e.metadata,
        }
    }
}

/// Database entity for the `workflow_rules` table.
#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRuleEntity {
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

impl From<WorkflowRuleEntity> for WorkflowRule {
    fn from(e: WorkflowRuleEntity) -> Self {
        WorkflowRule {
            id: e.id,
            job_id: e.job_id,
            remote_id: e.remote_id,
            object_name: e.object_name,
            name: e.name,
            full_name: e.full_name,
            enabled: e.enabled,
            description: e.description,
            formula: e.formula,
            trigger_type: e.trigger_type,
            metadata: e.metadata,
        }
    }
}

/// Database entity for the `apex_triggers` table.
#[derive(Debug, Clone, FromRow)]
pub struct ApexTriggerEntity {
    pub id: i64,
    pub job_id: i64,
    pub remote_id: String,
    pub name: String,
    pub object_name: String,
    pub enabled: bool,
    pub api_version: String,
    pub metadata: JsonValue,
}

impl From<ApexTriggerEntity> for ApexTrigger {
    fn from(e: ApexTriggerEntity) -> Self {
        ApexTrigger {
            id: e.id,
            job_id: e.job_id,
            remote_id: e.remote_id,
            name: e.name,
            object_name: e.object_name,
            enabled: e.enabled,
            api_version: e.api_version,
            metadata: e.metadata,
        }
    }
}
