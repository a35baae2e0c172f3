//! Common test utilities for integration tests.
//!
//! Tests run the real router against the in-memory job store and a fake
//! Salesforce org served by axum on an ephemeral local port.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::models::CredentialContext;
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use domain::services::JobStore;
use persistence::InMemoryJobStore;
use serde_json::{json, Value};
use sfswitch_api::app::{self, Background};
use sfswitch_api::config::Config;
use sfswitch_api::services::SalesforceClient;
use tower::ServiceExt;

pub const ACCESS_TOKEN: &str = "00D5g000004Fa1b!valid-session";
pub const ORG_ID: &str = "00D5g000004Fa1bEAC";

// ============================================================================
// Fake org
// ============================================================================

#[derive(Debug, Clone)]
pub struct FakeValidationRule {
    pub id: String,
    pub object: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct FakeWorkflowRule {
    pub id: String,
    pub object: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct FakeTrigger {
    pub id: String,
    pub name: String,
    pub object: String,
    pub status: String,
}

/// Mutable contents and behavior switches of the fake org.
#[derive(Debug, Default)]
pub struct OrgData {
    pub validation_rules: Vec<FakeValidationRule>,
    pub workflow_rules: Vec<FakeWorkflowRule>,
    pub triggers: Vec<FakeTrigger>,
    /// Status returned for every query instead of data.
    pub query_failure: Option<StatusCode>,
    /// Error code every composite sub-request fails with.
    pub reject_deploys: Option<String>,
    pub composite_requests: Vec<Value>,
    pub query_count: usize,
    /// Added latency on every definition read.
    pub definition_delay: Option<Duration>,
    pub definitions_in_flight: usize,
    pub peak_definitions_in_flight: usize,
}

#[derive(Clone)]
pub struct FakeOrg {
    pub base_url: String,
    pub username: String,
    pub data: Arc<Mutex<OrgData>>,
}

impl FakeOrg {
    /// Serves an org holding two validation rules, one workflow rule and two
    /// triggers, one of them deleted.
    pub async fn start() -> Self {
        let data = OrgData {
            validation_rules: vec![
                FakeValidationRule {
                    id: "03d5g0000000001AAA".into(),
                    object: "Account".into(),
                    name: "Require_Phone".into(),
                    active: true,
                },
                FakeValidationRule {
                    id: "03d5g0000000002AAA".into(),
                    object: "Contact".into(),
                    name: "Require_Email".into(),
                    active: false,
                },
            ],
            workflow_rules: vec![FakeWorkflowRule {
                id: "01Q5g0000000001AAA".into(),
                object: "Account".into(),
                name: "Notify_Owner".into(),
                active: true,
            }],
            triggers: vec![
                FakeTrigger {
                    id: "01q5g0000000001AAA".into(),
                    name: "AccountTrigger".into(),
                    object: "Account".into(),
                    status: "Active".into(),
                },
                FakeTrigger {
                    id: "01q5g0000000002AAA".into(),
                    name: "LegacyTrigger".into(),
                    object: "Contact".into(),
                    status: "Deleted".into(),
                },
            ],
            ..Default::default()
        };
        Self::serve(data).await
    }

    pub async fn serve(data: OrgData) -> Self {
        let data = Arc::new(Mutex::new(data));
        let router = Router::new()
            .route("/services/data/:version/tooling/query", get(query))
            .route("/services/data/:version/tooling/query/:locator", get(query_more))
            .route(
                "/services/data/:version/tooling/sobjects/:sobject/:id",
                get(definition),
            )
            .route("/services/data/:version/tooling/composite", post(composite))
            .with_state(data.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake org");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            username: SafeEmail().fake(),
            data,
        }
    }

    pub fn set_query_failure(&self, status: StatusCode) {
        self.data.lock().unwrap().query_failure = Some(status);
    }

    pub fn reject_deploys(&self, error_code: &str) {
        self.data.lock().unwrap().reject_deploys = Some(error_code.to_string());
    }

    pub fn validation_rule_active(&self, name: &str) -> bool {
        let data = self.data.lock().unwrap();
        data.validation_rules
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.active)
            .expect("unknown validation rule")
    }

    pub fn trigger_status(&self, name: &str) -> String {
        let data = self.data.lock().unwrap();
        data.triggers
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.status.clone())
            .expect("unknown trigger")
    }

    pub fn composite_requests(&self) -> Vec<Value> {
        self.data.lock().unwrap().composite_requests.clone()
    }

    pub fn credential_context(&self) -> CredentialContext {
        serde_json::from_value(self.credentials()).expect("credentials")
    }

    pub fn credentials(&self) -> Value {
        json!({
            "orgId": ORG_ID,
            "orgName": "Acme",
            "username": self.username,
            "instanceUrl": self.base_url,
            "accessToken": ACCESS_TOKEN,
        })
    }
}

type OrgState = Arc<Mutex<OrgData>>;

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!([{"errorCode": code, "message": message}]))).into_response()
}

fn check_auth(headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {}", ACCESS_TOKEN);
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
        _ => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "INVALID_SESSION_ID",
            "Session expired or invalid",
        )),
    }
}

fn validation_rule_rows(data: &OrgData) -> Vec<Value> {
    data.validation_rules
        .iter()
        .map(|r| {
            json!({
                "Id": r.id,
                "ValidationName": r.name,
                "Active": r.active,
                "Description": null,
                "ErrorMessage": format!("{} is required", r.name),
                "ErrorDisplayField": null,
                "EntityDefinition": {"QualifiedApiName": r.object},
            })
        })
        .collect()
}

/// Validation rules are served one per page to exercise `nextRecordsUrl`.
fn validation_rule_page(data: &OrgData, version: &str, offset: usize) -> Value {
    let rows = validation_rule_rows(data);
    let next = (offset + 1 < rows.len())
        .then(|| format!("/services/data/{}/tooling/query/vr-{}", version, offset + 1));
    json!({
        "totalSize": rows.len(),
        "done": next.is_none(),
        "records": rows.get(offset).cloned().into_iter().collect::<Vec<_>>(),
        "nextRecordsUrl": next,
    })
}

async fn query(
    State(state): State<OrgState>,
    Path(version): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let mut data = state.lock().unwrap();
    data.query_count += 1;
    if let Some(status) = data.query_failure {
        let code = match status {
            StatusCode::FORBIDDEN => "REQUEST_LIMIT_EXCEEDED",
            s if s.is_server_error() => "SERVER_UNAVAILABLE",
            _ => "MALFORMED_QUERY",
        };
        return error_response(status, code, "Query refused");
    }

    let soql = params.get("q").cloned().unwrap_or_default();
    let body = if soql.contains("FROM ValidationRule") {
        validation_rule_page(&data, &version, 0)
    } else if soql.contains("FROM WorkflowRule") {
        let records: Vec<Value> = data
            .workflow_rules
            .iter()
            .map(|r| json!({"Id": r.id, "Name": r.name, "TableEnumOrId": r.object}))
            .collect();
        json!({"totalSize": records.len(), "done": true, "records": records})
    } else if soql.contains("FROM ApexTrigger") {
        let records: Vec<Value> = data
            .triggers
            .iter()
            .map(|t| {
                json!({
                    "Id": t.id,
                    "Name": t.name,
                    "TableEnumOrId": t.object,
                    "Status": t.status,
                    "ApiVersion": 59.0,
                })
            })
            .collect();
        json!({"totalSize": records.len(), "done": true, "records": records})
    } else {
        return error_response(StatusCode::BAD_REQUEST, "MALFORMED_QUERY", &soql);
    };

    Json(body).into_response()
}

async fn query_more(
    State(state): State<OrgState>,
    Path((version, locator)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let data = state.lock().unwrap();
    match locator
        .strip_prefix("vr-")
        .and_then(|offset| offset.parse::<usize>().ok())
    {
        Some(offset) => Json(validation_rule_page(&data, &version, offset)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "INVALID_QUERY_LOCATOR", &locator),
    }
}

async fn definition(
    State(state): State<OrgState>,
    Path((_version, sobject, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let delay = {
        let mut data = state.lock().unwrap();
        data.definitions_in_flight += 1;
        data.peak_definitions_in_flight = data
            .peak_definitions_in_flight
            .max(data.definitions_in_flight);
        data.definition_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut data = state.lock().unwrap();
    data.definitions_in_flight -= 1;
    let body = match sobject.as_str() {
        "ValidationRule" => data.validation_rules.iter().find(|r| r.id == id).map(|r| {
            json!({
                "FullName": format!("{}.{}", r.object, r.name),
                "Metadata": {
                    "active": r.active,
                    "errorConditionFormula": "ISBLANK(Phone)",
                    "errorMessage": format!("{} is required", r.name),
                },
            })
        }),
        "WorkflowRule" => data.workflow_rules.iter().find(|r| r.id == id).map(|r| {
            json!({
                "FullName": format!("{}.{}", r.object, r.name),
                "Metadata": {
                    "active": r.active,
                    "formula": "true",
                    "triggerType": "onCreateOnly",
                },
            })
        }),
        _ => None,
    };

    match body {
        Some(body) => Json(body).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "The requested resource does not exist"),
    }
}

/// Applies each PATCH to the org unless deploys are set to fail, in which
/// case nothing is applied (allOrNone).
async fn composite(
    State(state): State<OrgState>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let mut data = state.lock().unwrap();
    data.composite_requests.push(request.clone());

    let subrequests = request["compositeRequest"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    if let Some(code) = data.reject_deploys.clone() {
        let responses: Vec<Value> = subrequests
            .iter()
            .enumerate()
            .map(|(i, sub)| {
                let (code, message) = if i == 0 {
                    (code.as_str(), "Rejected by the org")
                } else {
                    ("PROCESSING_HALTED", "The transaction was rolled back")
                };
                json!({
                    "httpStatusCode": 400,
                    "referenceId": sub["referenceId"],
                    "body": [{"errorCode": code, "message": message}],
                })
            })
            .collect();
        return Json(json!({"compositeResponse": responses})).into_response();
    }

    let mut responses = Vec::with_capacity(subrequests.len());
    for sub in &subrequests {
        let url = sub["url"].as_str().unwrap_or_default();
        let id = url.rsplit('/').next().unwrap_or_default();
        let metadata = &sub["body"]["Metadata"];

        let found = if url.contains("/sobjects/ValidationRule/") {
            data.validation_rules
                .iter_mut()
                .find(|r| r.id == id)
                .map(|r| r.active = metadata["active"].as_bool().unwrap_or(r.active))
        } else if url.contains("/sobjects/WorkflowRule/") {
            data.workflow_rules
                .iter_mut()
                .find(|r| r.id == id)
                .map(|r| r.active = metadata["active"].as_bool().unwrap_or(r.active))
        } else if url.contains("/sobjects/ApexTrigger/") {
            data.triggers.iter_mut().find(|t| t.id == id).map(|t| {
                if let Some(status) = metadata["status"].as_str() {
                    t.status = status.to_string();
                }
            })
        } else {
            None
        };

        responses.push(match found {
            Some(()) => json!({"httpStatusCode": 204, "referenceId": sub["referenceId"], "body": null}),
            None => json!({
                "httpStatusCode": 404,
                "referenceId": sub["referenceId"],
                "body": [{"errorCode": "NOT_FOUND", "message": "The requested resource does not exist"}],
            }),
        });
    }

    Json(json!({"compositeResponse": responses})).into_response()
}

// ============================================================================
// Application
// ============================================================================

/// Test configuration backed by the in-memory store.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut all = vec![("database.url", "memory://")];
    all.extend_from_slice(overrides);
    Config::load_for_test(&all).expect("Failed to load test config")
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryJobStore>,
    pub background: Background,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config(&[])).await
    }

    pub async fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryJobStore::new());
        let api = Arc::new(
            SalesforceClient::new(config.salesforce.clone()).expect("Failed to build client"),
        );
        let (router, background) = app::build(config, store.clone() as Arc<dyn JobStore>, api);
        Self {
            router,
            store,
            background,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self.request(get_request(uri)).await;
        let status = response.status();
        (status, parse_response_body(response).await)
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        let response = self.request(json_request(Method::POST, uri, body)).await;
        let status = response.status();
        (status, parse_response_body(response).await)
    }

    pub async fn post_raw(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.request(request).await;
        let status = response.status();
        (status, parse_response_body(response).await)
    }

    /// Creates a fetch job for `org` and returns its token.
    pub async fn create_job(&self, org: &FakeOrg) -> String {
        let (status, body) = self.post_json("/api/v1/jobs", &org.credentials()).await;
        assert_eq!(status, StatusCode::ACCEPTED, "unexpected body: {}", body);
        body["jobId"].as_str().expect("jobId").to_string()
    }

    /// Polls a status URL until it reports a terminal status.
    pub async fn wait_for_terminal(&self, status_url: &str) -> Value {
        for _ in 0..200 {
            let (status, body) = self.get_json(status_url).await;
            assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
            if body["status"] == "Finished" || body["status"] == "Error" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("{} never reached a terminal status", status_url);
    }

    /// Creates a job and waits for its fetch to finish.
    pub async fn fetched_job(&self, org: &FakeOrg) -> String {
        let job_id = self.create_job(org).await;
        let status = self
            .wait_for_terminal(&format!("/api/v1/jobs/{}/status", job_id))
            .await;
        assert_eq!(status["status"], "Finished", "fetch failed: {}", status);
        job_id
    }

    pub async fn shutdown(self) {
        self.background.shutdown(Duration::from_secs(1)).await;
    }
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

pub async fn parse_response_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// Finds the id of a listed record by name in a job detail payload.
pub fn record_id(detail: &Value, list: &str, name: &str) -> i64 {
    detail[list]
        .as_array()
        .and_then(|items| items.iter().find(|item| item["name"] == name))
        .and_then(|item| item["id"].as_i64())
        .unwrap_or_else(|| panic!("{} {} not found in {}", list, name, detail))
}
