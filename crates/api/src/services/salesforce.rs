//! Salesforce Tooling API client.
//!
//! Lists validation rules, workflow rules and Apex triggers of an org and
//! deploys activation changes through the composite endpoint.

use std::time::Duration;

use async_trait::async_trait;
use domain::models::{
    CredentialContext, MetadataChange, NewApexTrigger, NewValidationRule, NewWorkflowRule,
};
use domain::services::MetadataApi;
use domain::SyncError;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::config::SalesforceConfig;

const VALIDATION_RULE_QUERY: &str = "SELECT Id, ValidationName, Active, Description, \
     ErrorMessage, ErrorDisplayField, EntityDefinition.QualifiedApiName \
     FROM ValidationRule WHERE NamespacePrefix = null";

const WORKFLOW_RULE_QUERY: &str =
    "SELECT Id, Name, TableEnumOrId FROM WorkflowRule WHERE NamespacePrefix = null";

const TRIGGER_QUERY: &str = "SELECT Id, Name, TableEnumOrId, Status, ApiVersion \
     FROM ApexTrigger WHERE NamespacePrefix = null";

/// Error code Salesforce returns with a 403 once the org's API quota is spent.
const REQUEST_LIMIT_EXCEEDED: &str = "REQUEST_LIMIT_EXCEEDED";

/// Error code of composite sub-requests rolled back because another failed.
const PROCESSING_HALTED: &str = "PROCESSING_HALTED";

/// Longest raw body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 500;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse<T> {
    records: Vec<T>,
    #[serde(default)]
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EntityDefinitionRef {
    qualified_api_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValidationRuleRow {
    id: String,
    validation_name: String,
    active: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    error_display_field: Option<String>,
    #[serde(default)]
    entity_definition: Option<EntityDefinitionRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WorkflowRuleRow {
    id: String,
    name: String,
    table_enum_or_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TriggerRow {
    id: String,
    name: String,
    table_enum_or_id: String,
    status: String,
    api_version: f64,
}

/// Single-record Tooling read: the only shape that carries `Metadata`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ToolingDefinition {
    full_name: String,
    metadata: JsonValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorItem {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompositeRequest<'a> {
    all_or_none: bool,
    composite_request: Vec<CompositeSubrequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompositeSubrequest<'a> {
    method: &'static str,
    url: String,
    reference_id: String,
    body: JsonValue,
    #[serde(skip)]
    full_name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositeResponse {
    composite_response: Vec<CompositeSubresponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompositeSubresponse {
    http_status_code: u16,
    reference_id: String,
    #[serde(default)]
    body: JsonValue,
}

// ============================================================================
// Error mapping
// ============================================================================

/// Renders a Salesforce error body (`[{errorCode, message}]`) for humans.
fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<Vec<ApiErrorItem>>(body) {
        Ok(items) if !items.is_empty() => items
            .iter()
            .map(|item| match (&item.error_code, &item.message) {
                (Some(code), Some(msg)) => format!("{}: {}", code, msg),
                (None, Some(msg)) => msg.clone(),
                (Some(code), None) => code.clone(),
                (None, None) => "unknown error".to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response body".to_string()
            } else {
                trimmed.chars().take(MAX_ERROR_BODY).collect()
            }
        }
    }
}

/// Maps a non-success HTTP status to the error taxonomy.
fn error_from_status(status: StatusCode, body: &str) -> SyncError {
    let detail = describe_error_body(body);
    match status {
        StatusCode::UNAUTHORIZED => SyncError::Authentication(detail),
        StatusCode::FORBIDDEN if body.contains(REQUEST_LIMIT_EXCEEDED) => {
            SyncError::RateLimited(detail)
        }
        s if s.is_server_error() => SyncError::Network(format!("HTTP {}: {}", s.as_u16(), detail)),
        s => SyncError::Validation(format!("HTTP {}: {}", s.as_u16(), detail)),
    }
}

fn is_halted(response: &CompositeSubresponse) -> bool {
    response.body.to_string().contains(PROCESSING_HALTED)
}

/// Collects the messages of failed composite sub-requests.
///
/// Sub-requests halted only because a sibling failed are left out unless
/// nothing else explains the failure.
fn composite_failures(responses: &[CompositeSubresponse], names: &[&str]) -> Option<String> {
    let failed: Vec<_> = responses
        .iter()
        .filter(|r| !(200..300).contains(&r.http_status_code))
        .collect();
    if failed.is_empty() {
        return None;
    }

    let name_of = |reference_id: &str| {
        reference_id
            .strip_prefix('c')
            .and_then(|i| i.parse::<usize>().ok())
            .and_then(|i| names.get(i).copied())
            .unwrap_or(reference_id)
            .to_string()
    };

    let root_causes: Vec<&CompositeSubresponse> =
        failed.iter().copied().filter(|r| !is_halted(r)).collect();
    let reported = if root_causes.is_empty() {
        failed
    } else {
        root_causes
    };

    Some(
        reported
            .iter()
            .map(|r| {
                format!(
                    "{}: {}",
                    name_of(&r.reference_id),
                    describe_error_body(&r.body.to_string())
                )
            })
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Notes how much of a multi-batch deploy had already gone through.
fn annotate_partial(err: SyncError, applied: usize, total: usize) -> SyncError {
    if applied == 0 {
        return err;
    }
    let note = |msg: String| {
        format!(
            "{} ({} of {} components had already been applied)",
            msg, applied, total
        )
    };
    match err {
        SyncError::Authentication(m) => SyncError::Authentication(note(m)),
        SyncError::Network(m) => SyncError::Network(note(m)),
        SyncError::RateLimited(m) => SyncError::RateLimited(note(m)),
        SyncError::Validation(m) => SyncError::Validation(note(m)),
        SyncError::InvalidResponse(m) => SyncError::InvalidResponse(note(m)),
        other => other,
    }
}

// ============================================================================
// Client
// ============================================================================

/// Tooling API client shared by every task.
///
/// Holds no org state: each call carries its own credentials.
#[derive(Clone)]
pub struct SalesforceClient {
    client: Client,
    config: SalesforceConfig,
}

impl SalesforceClient {
    /// Create a new client with the configured per-request timeout.
    pub fn new(config: SalesforceConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("sfswitch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn data_path(&self) -> String {
        format!("/services/data/v{}", self.config.api_version)
    }

    fn tooling_url(&self, credentials: &CredentialContext, path: &str) -> String {
        format!(
            "{}{}/tooling{}",
            credentials.base_url(),
            self.data_path(),
            path
        )
    }

    fn map_send_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(Duration::from_secs(self.config.request_timeout_secs))
        } else if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }

    async fn send(
        &self,
        credentials: &CredentialContext,
        request: RequestBuilder,
    ) -> Result<Response, SyncError> {
        let response = request
            .bearer_auth(&credentials.access_token)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = error_from_status(status, &body);
        warn!(
            org_id = %credentials.org_id,
            token_fingerprint = %credentials.token_fingerprint(),
            status = status.as_u16(),
            error = %err,
            "Salesforce request failed"
        );
        Err(err)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        credentials: &CredentialContext,
        url: &str,
    ) -> Result<T, SyncError> {
        let response = self.send(credentials, self.client.get(url)).await?;
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        serde_json::from_str(&body).map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }

    /// Runs a Tooling SOQL query and follows `nextRecordsUrl` to the end.
    async fn query<T: DeserializeOwned>(
        &self,
        credentials: &CredentialContext,
        soql: &str,
    ) -> Result<Vec<T>, SyncError> {
        let first_url = self.tooling_url(credentials, "/query");
        let request = self.client.get(&first_url).query(&[("q", soql)]);
        let response = self.send(credentials, request).await?;
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let mut page: QueryResponse<T> =
            serde_json::from_str(&body).map_err(|e| SyncError::InvalidResponse(e.to_string()))?;

        let mut records = Vec::new();
        loop {
            records.append(&mut page.records);
            let Some(next) = page.next_records_url.take() else {
                break;
            };
            let url = format!("{}{}", credentials.base_url(), next);
            page = self.get_json(credentials, &url).await?;
        }

        Ok(records)
    }

    async fn fetch_definition(
        &self,
        credentials: &CredentialContext,
        sobject: &str,
        id: &str,
    ) -> Result<ToolingDefinition, SyncError> {
        let url = self.tooling_url(credentials, &format!("/sobjects/{}/{}", sobject, id));
        let definition: ToolingDefinition = self.get_json(credentials, &url).await?;
        if !definition.metadata.is_object() {
            return Err(SyncError::InvalidResponse(format!(
                "{} {} has no Metadata object",
                sobject, id
            )));
        }
        Ok(definition)
    }

    /// Reads definitions with bounded concurrency, in the order of `ids`.
    async fn fetch_definitions<'a>(
        &self,
        credentials: &CredentialContext,
        sobject: &str,
        ids: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<ToolingDefinition>, SyncError> {
        let fetches: Vec<_> = ids
            .map(|id| self.fetch_definition(credentials, sobject, id))
            .collect();
        stream::iter(fetches)
            .buffered(self.config.definition_concurrency.max(1))
            .try_collect()
            .await
    }

    async fn deploy_batch(
        &self,
        credentials: &CredentialContext,
        changes: &[MetadataChange],
    ) -> Result<(), SyncError> {
        let subrequests: Vec<_> = changes
            .iter()
            .enumerate()
            .map(|(i, change)| CompositeSubrequest {
                method: "PATCH",
                url: format!(
                    "{}/tooling/sobjects/{}/{}",
                    self.data_path(),
                    change.metadata_type.sobject_name(),
                    change.remote_id
                ),
                reference_id: format!("c{}", i),
                body: json!({ "Metadata": change.metadata }),
                full_name: &change.full_name,
            })
            .collect();
        let names: Vec<&str> = subrequests.iter().map(|s| s.full_name).collect();

        let request = self
            .client
            .post(self.tooling_url(credentials, "/composite"))
            .json(&CompositeRequest {
                all_or_none: true,
                composite_request: subrequests,
            });
        let response = self.send(credentials, request).await?;
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let result: CompositeResponse =
            serde_json::from_str(&body).map_err(|e| SyncError::InvalidResponse(e.to_string()))?;

        if result.composite_response.len() != changes.len() {
            return Err(SyncError::InvalidResponse(format!(
                "composite response has {} results for {} requests",
                result.composite_response.len(),
                changes.len()
            )));
        }

        match composite_failures(&result.composite_response, &names) {
            Some(message) => Err(SyncError::Validation(message)),
            None => Ok(()),
        }
    }
}

fn object_from_full_name(full_name: &str) -> Option<&str> {
    full_name.split_once('.').map(|(object, _)| object)
}

fn metadata_str(metadata: &JsonValue, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

/// `ApiVersion` comes back as a number; keep it as `59.0`.
fn format_api_version(version: f64) -> String {
    format!("{:.1}", version)
}

#[async_trait]
impl MetadataApi for SalesforceClient {
    async fn fetch_validation_rules(
        &self,
        credentials: &CredentialContext,
    ) -> Result<Vec<NewValidationRule>, SyncError> {
        let rows: Vec<ValidationRuleRow> = self.query(credentials, VALIDATION_RULE_QUERY).await?;
        debug!(org_id = %credentials.org_id, count = rows.len(), "Listed validation rules");

        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        let definitions = self
            .fetch_definitions(credentials, "ValidationRule", ids.into_iter())
            .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for (row, definition) in rows.into_iter().zip(definitions) {
            let object_name = row
                .entity_definition
                .map(|e| e.qualified_api_name)
                .or_else(|| object_from_full_name(&definition.full_name).map(str::to_string))
                .ok_or_else(|| {
                    SyncError::InvalidResponse(format!(
                        "validation rule {} has no object",
                        row.id
                    ))
                })?;

            rules.push(NewValidationRule {
                error_condition_formula: metadata_str(&definition.metadata, "errorConditionFormula"),
                remote_id: row.id,
                object_name,
                name: row.validation_name,
                full_name: definition.full_name,
                enabled: row.active,
                description: row.description,
                error_message: row.error_message,
                error_display_field: row.error_display_field,
                metadata: definition.metadata,
            });
        }

        Ok(rules)
    }

    async fn fetch_workflow_rules(
        &self,
        credentials: &CredentialContext,
    ) -> Result<Vec<NewWorkflowRule>, SyncError> {
        let rows: Vec<WorkflowRuleRow> = self.query(credentials, WORKFLOW_RULE_QUERY).await?;
        debug!(org_id = %credentials.org_id, count = rows.len(), "Listed workflow rules");

        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        let definitions = self
            .fetch_definitions(credentials, "WorkflowRule", ids.into_iter())
            .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for (row, definition) in rows.into_iter().zip(definitions) {
            let enabled = definition
                .metadata
                .get("active")
                .and_then(JsonValue::as_bool)
                .ok_or_else(|| {
                    SyncError::InvalidResponse(format!(
                        "workflow rule {} has no active flag",
                        row.id
                    ))
                })?;

            rules.push(NewWorkflowRule {
                description: metadata_str(&definition.metadata, "description"),
                formula: metadata_str(&definition.metadata, "formula"),
                trigger_type: metadata_str(&definition.metadata, "triggerType"),
                remote_id: row.id,
                object_name: row.table_enum_or_id,
                name: row.name,
                full_name: definition.full_name,
                enabled,
                metadata: definition.metadata,
            });
        }

        Ok(rules)
    }

    async fn fetch_triggers(
        &self,
        credentials: &CredentialContext,
    ) -> Result<Vec<NewApexTrigger>, SyncError> {
        let rows: Vec<TriggerRow> = self.query(credentials, TRIGGER_QUERY).await?;
        debug!(org_id = %credentials.org_id, count = rows.len(), "Listed Apex triggers");

        Ok(rows
            .into_iter()
            .filter(|row| row.status != "Deleted")
            .map(|row| NewApexTrigger {
                enabled: row.status == "Active",
                api_version: format_api_version(row.api_version),
                metadata: json!({ "apiVersion": row.api_version, "status": row.status }),
                remote_id: row.id,
                name: row.name,
                object_name: row.table_enum_or_id,
            })
            .collect())
    }

    async fn deploy(
        &self,
        credentials: &CredentialContext,
        changes: &[MetadataChange],
    ) -> Result<(), SyncError> {
        let total = changes.len();
        let mut applied = 0;

        for batch in changes.chunks(self.config.composite_batch_size.max(1)) {
            self.deploy_batch(credentials, batch)
                .await
                .map_err(|e| annotate_partial(e, applied, total))?;
            applied += batch.len();
            debug!(org_id = %credentials.org_id, applied, total, "Deployed composite batch");
        }

        info!(
            org_id = %credentials.org_id,
            token_fingerprint = %credentials.token_fingerprint(),
            components = total,
            "Deployed metadata changes"
        );
        Ok(())
    }
}
