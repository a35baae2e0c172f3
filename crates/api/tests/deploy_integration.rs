//! Integration tests for deploy job endpoints.
//!
//! Run with: cargo test --test deploy_integration

mod common;

use axum::http::StatusCode;
use common::{record_id, test_config, FakeOrg, TestApp};
use serde_json::{json, Value};

async fn submit(app: &TestApp, job_id: &str, metadata_type: &str, body: &Value) -> Value {
    let (status, response) = app
        .post_json(
            &format!("/api/v1/jobs/{}/deploy/{}", job_id, metadata_type),
            body,
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "unexpected body: {}", response);
    response
}

async fn job_detail(app: &TestApp, job_id: &str) -> Value {
    let (status, detail) = app.get_json(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    detail
}

// ============================================================================
// Deploy Tests
// ============================================================================

#[tokio::test]
async fn test_deploy_disables_validation_rule() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;
    let job_id = app.fetched_job(&org).await;

    let detail = job_detail(&app, &job_id).await;
    let rule_id = record_id(&detail, "validationRules", "Require_Phone");

    let created = submit(
        &app,
        &job_id,
        "validation_rule",
        &json!([{"component_id": rule_id, "enable": false}]),
    )
    .await;
    assert_eq!(created["status"], "Not Started");
    let deploy_job_id = created["deployJobId"].as_i64().unwrap();
    assert_eq!(
        created["statusUrl"],
        format!("/api/v1/deploy-jobs/{}/status", deploy_job_id)
    );

    let status = app
        .wait_for_terminal(created["statusUrl"].as_str().unwrap())
        .await;
    assert_eq!(status["status"], "Finished", "{}", status);

    // The org and the stored snapshot agree on the new state.
    assert!(!org.validation_rule_active("Require_Phone"));
    assert!(!org.validation_rule_active("Require_Email"));
    let detail = job_detail(&app, &job_id).await;
    let rule = detail["validationRules"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == rule_id)
        .unwrap();
    assert_eq!(rule["enabled"], false);

    // The stored definition is resubmitted with only the flag changed.
    let requests = org.composite_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["allOrNone"], true);
    let sub = &requests[0]["compositeRequest"][0];
    assert_eq!(sub["method"], "PATCH");
    assert_eq!(
        sub["url"],
        "/services/data/v59.0/tooling/sobjects/ValidationRule/03d5g0000000001AAA"
    );
    assert_eq!(sub["body"]["Metadata"]["active"], false);
    assert_eq!(sub["body"]["Metadata"]["errorConditionFormula"], "ISBLANK(Phone)");

    app.shutdown().await;
}

#[tokio::test]
async fn test_deploy_switches_triggers_and_workflows() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;
    let job_id = app.fetched_job(&org).await;
    let detail = job_detail(&app, &job_id).await;

    let trigger_id = record_id(&detail, "triggers", "AccountTrigger");
    let created = submit(
        &app,
        &job_id,
        "trigger",
        &json!([{"component_id": trigger_id.to_string(), "enable": false}]),
    )
    .await;
    let status = app
        .wait_for_terminal(created["statusUrl"].as_str().unwrap())
        .await;
    assert_eq!(status["status"], "Finished", "{}", status);
    assert_eq!(org.trigger_status("AccountTrigger"), "Inactive");

    let workflow_id = record_id(&detail, "workflowRules", "Notify_Owner");
    let created = submit(
        &app,
        &job_id,
        "workflow_rule",
        &json!([{"component_id": workflow_id, "enable": false}]),
    )
    .await;
    let status = app
        .wait_for_terminal(created["statusUrl"].as_str().unwrap())
        .await;
    assert_eq!(status["status"], "Finished", "{}", status);

    let detail = job_detail(&app, &job_id).await;
    assert_eq!(detail["triggers"][0]["enabled"], false);
    assert_eq!(detail["workflowRules"][0]["enabled"], false);

    app.shutdown().await;
}

#[tokio::test]
async fn test_deploy_job_detail_lists_components() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;
    let job_id = app.fetched_job(&org).await;
    let detail = job_detail(&app, &job_id).await;

    let phone = record_id(&detail, "validationRules", "Require_Phone");
    let email = record_id(&detail, "validationRules", "Require_Email");
    let created = submit(
        &app,
        &job_id,
        "validation_rule",
        &json!([
            {"component_id": phone, "enable": false},
            {"component_id": email, "enable": true},
        ]),
    )
    .await;
    let deploy_job_id = created["deployJobId"].as_i64().unwrap();
    app.wait_for_terminal(created["statusUrl"].as_str().unwrap())
        .await;

    let (status, body) = app
        .get_json(&format!("/api/v1/deploy-jobs/{}", deploy_job_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deployJobId"], deploy_job_id);
    assert_eq!(body["metadataType"], "validation_rule");
    assert_eq!(body["status"], "Finished");

    let components = body["components"].as_array().unwrap();
    assert_eq!(components.len(), 2);
    assert!(components.iter().any(|c| {
        c["component"] == json!({"type": "validation_rule", "id": email}) && c["enable"] == true
    }));

    assert!(org.validation_rule_active("Require_Email"));
    assert!(!org.validation_rule_active("Require_Phone"));

    app.shutdown().await;
}

#[tokio::test]
async fn test_deploys_are_batched() {
    let org = FakeOrg::start().await;
    let app = TestApp::with_config(test_config(&[("salesforce.composite_batch_size", "1")])).await;
    let job_id = app.fetched_job(&org).await;
    let detail = job_detail(&app, &job_id).await;

    let created = submit(
        &app,
        &job_id,
        "validation_rule",
        &json!([
            {"component_id": record_id(&detail, "validationRules", "Require_Phone"), "enable": false},
            {"component_id": record_id(&detail, "validationRules", "Require_Email"), "enable": true},
        ]),
    )
    .await;
    let status = app
        .wait_for_terminal(created["statusUrl"].as_str().unwrap())
        .await;
    assert_eq!(status["status"], "Finished", "{}", status);
    assert_eq!(org.composite_requests().len(), 2);

    app.shutdown().await;
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_remote_rejection_ends_in_error() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;
    let job_id = app.fetched_job(&org).await;
    let detail = job_detail(&app, &job_id).await;
    org.reject_deploys("FIELD_INTEGRITY_EXCEPTION");

    let created = submit(
        &app,
        &job_id,
        "validation_rule",
        &json!([
            {"component_id": record_id(&detail, "validationRules", "Require_Phone"), "enable": false},
            {"component_id": record_id(&detail, "validationRules", "Require_Email"), "enable": true},
        ]),
    )
    .await;
    let status = app
        .wait_for_terminal(created["statusUrl"].as_str().unwrap())
        .await;

    assert_eq!(status["status"], "Error");
    let error = status["error"].as_str().unwrap();
    assert!(error.contains("FIELD_INTEGRITY_EXCEPTION"), "{}", error);

    // Nothing changed locally or remotely.
    assert!(org.validation_rule_active("Require_Phone"));
    let detail = job_detail(&app, &job_id).await;
    let phone = detail["validationRules"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "Require_Phone")
        .unwrap();
    assert_eq!(phone["enabled"], true);

    app.shutdown().await;
}

#[tokio::test]
async fn test_malformed_selection_creates_failed_deploy_job() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;
    let job_id = app.fetched_job(&org).await;

    for body in ["", "not json", "[]", "[{\"component_id\": \"abc\", \"enable\": true}]"] {
        let (status, created) = app
            .post_raw(
                &format!("/api/v1/jobs/{}/deploy/validation_rule", job_id),
                body,
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "body {:?}", body);
        assert_eq!(created["status"], "Error", "body {:?}", body);

        let (_, status) = app
            .get_json(created["statusUrl"].as_str().unwrap())
            .await;
        assert_eq!(status["status"], "Error");
        assert!(status["error"].is_string());
    }

    assert!(org.composite_requests().is_empty());
    app.shutdown().await;
}

#[tokio::test]
async fn test_component_from_another_job_is_rejected() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;
    let first = app.fetched_job(&org).await;
    let second = app.fetched_job(&org).await;

    let foreign = record_id(&job_detail(&app, &first).await, "validationRules", "Require_Phone");
    let created = submit(
        &app,
        &second,
        "validation_rule",
        &json!([{"component_id": foreign, "enable": false}]),
    )
    .await;

    assert_eq!(created["status"], "Error");
    let (_, status) = app
        .get_json(created["statusUrl"].as_str().unwrap())
        .await;
    assert!(status["error"]
        .as_str()
        .unwrap()
        .contains("does not belong to job"));
    assert!(org.composite_requests().is_empty());

    app.shutdown().await;
}

#[tokio::test]
async fn test_unknown_metadata_type_is_bad_request() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;
    let job_id = app.fetched_job(&org).await;

    let (status, body) = app
        .post_json(
            &format!("/api/v1/jobs/{}/deploy/flow", job_id),
            &json!([{"component_id": 1, "enable": true}]),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    app.shutdown().await;
}

#[tokio::test]
async fn test_deploy_for_unknown_job_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app
        .post_json(
            "/api/v1/jobs/job_doesnotexist0000000000000000000/deploy/trigger",
            &json!([{"component_id": 1, "enable": true}]),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn test_unknown_deploy_job_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app.get_json("/api/v1/deploy-jobs/424242/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get_json("/api/v1/deploy-jobs/424242").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get_json("/api/v1/deploy-jobs/not-a-number").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.shutdown().await;
}
