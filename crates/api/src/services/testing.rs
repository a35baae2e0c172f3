//! Test doubles shared by the service tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use domain::models::{
    CredentialContext, MetadataChange, NewApexTrigger, NewValidationRule, NewWorkflowRule,
};
use domain::services::MetadataApi;
use domain::SyncError;
use serde_json::json;

/// In-process `MetadataApi` returning canned records.
#[derive(Default)]
pub struct StubMetadataApi {
    pub validation_rules: Vec<NewValidationRule>,
    pub workflow_rules: Vec<NewWorkflowRule>,
    pub triggers: Vec<NewApexTrigger>,
    /// Returned by `fetch_validation_rules` on every call.
    pub fetch_error: Option<SyncError>,
    pub deploy_error: Option<SyncError>,
    pub fetch_calls: AtomicUsize,
    pub deployed: Mutex<Vec<MetadataChange>>,
}

#[async_trait]
impl MetadataApi for StubMetadataApi {
    async fn fetch_validation_rules(
        &self,
        _credentials: &CredentialContext,
    ) -> Result<Vec<NewValidationRule>, SyncError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match &self.fetch_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.validation_rules.clone()),
        }
    }

    async fn fetch_workflow_rules(
        &self,
        _credentials: &CredentialContext,
    ) -> Result<Vec<NewWorkflowRule>, SyncError> {
        Ok(self.workflow_rules.clone())
    }

    async fn fetch_triggers(
        &self,
        _credentials: &CredentialContext,
    ) -> Result<Vec<NewApexTrigger>, SyncError> {
        Ok(self.triggers.clone())
    }

    async fn deploy(
        &self,
        _credentials: &CredentialContext,
        changes: &[MetadataChange],
    ) -> Result<(), SyncError> {
        if let Some(err) = &self.deploy_error {
            return Err(err.clone());
        }
        self.deployed.lock().unwrap().extend_from_slice(changes);
        Ok(())
    }
}

pub fn credentials() -> CredentialContext {
    CredentialContext {
        org_id: "00D5g000004Fa1bEAC".to_string(),
        org_name: "Acme".to_string(),
        username: "admin@acme.com".to_string(),
        instance_url: "https://acme.my.salesforce.com".to_string(),
        access_token: "00D5g000004Fa1b!session".to_string(),
    }
}

pub fn validation_rule(object_name: &str, name: &str) -> NewValidationRule {
    NewValidationRule {
        remote_id: format!("03d{}{}", object_name, name),
        object_name: object_name.to_string(),
        name: name.to_string(),
        full_name: format!("{}.{}", object_name, name),
        enabled: true,
        description: None,
        error_condition_formula: Some("ISBLANK(Phone)".to_string()),
        error_message: Some("Phone is required".to_string()),
        error_display_field: None,
        metadata: json!({"active": true, "errorConditionFormula": "ISBLANK(Phone)"}),
    }
}

pub fn workflow_rule(object_name: &str, name: &str) -> NewWorkflowRule {
    NewWorkflowRule {
        remote_id: format!("01Q{}{}", object_name, name),
        object_name: object_name.to_string(),
        name: name.to_string(),
        full_name: format!("{}.{}", object_name, name),
        enabled: true,
        description: None,
        formula: Some("true".to_string()),
        trigger_type: Some("onCreateOnly".to_string()),
        metadata: json!({"active": true, "triggerType": "onCreateOnly"}),
    }
}

pub fn trigger(name: &str) -> NewApexTrigger {
    NewApexTrigger {
        remote_id: format!("01q{}", name),
        name: name.to_string(),
        object_name: "Account".to_string(),
        enabled: true,
        api_version: "59.0".to_string(),
        metadata: json!({"apiVersion": 59.0, "status": "Active"}),
    }
}
