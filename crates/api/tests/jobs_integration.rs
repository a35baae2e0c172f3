//! Integration tests for fetch job endpoints.
//!
//! Each test runs the full router and worker pool against the in-memory job
//! store and a fake org served on a local port.
//!
//! Run with: cargo test --test jobs_integration

mod common;

use axum::http::StatusCode;
use common::{record_id, FakeOrg, TestApp, ORG_ID};
use serde_json::json;

// ============================================================================
// Job Creation Tests
// ============================================================================

#[tokio::test]
async fn test_create_job_returns_accepted() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;

    let (status, body) = app.post_json("/api/v1/jobs", &org.credentials()).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["jobId"].as_str().unwrap();
    assert!(job_id.starts_with("job_"));
    assert_eq!(body["status"], "Not Started");
    assert_eq!(
        body["statusUrl"],
        format!("/api/v1/jobs/{}/status", job_id)
    );

    app.shutdown().await;
}

#[tokio::test]
async fn test_create_job_rejects_invalid_credentials() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;

    let mut credentials = org.credentials();
    credentials["orgId"] = json!("not-an-org");
    let (status, body) = app.post_json("/api/v1/jobs", &credentials).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let mut credentials = org.credentials();
    credentials["instanceUrl"] = json!("http://acme.my.salesforce.com");
    let (status, _) = app.post_json("/api/v1/jobs", &credentials).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.shutdown().await;
}

#[tokio::test]
async fn test_create_job_rejects_unparseable_body() {
    let app = TestApp::new().await;

    let (status, _) = app.post_raw("/api/v1/jobs", "{\"orgId\":").await;
    assert!(status.is_client_error());

    app.shutdown().await;
}

// ============================================================================
// Fetch Tests
// ============================================================================

#[tokio::test]
async fn test_fetch_finishes_and_stores_metadata() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;

    let job_id = app.create_job(&org).await;
    let status = app
        .wait_for_terminal(&format!("/api/v1/jobs/{}/status", job_id))
        .await;
    assert_eq!(status["status"], "Finished");
    assert!(status["error"].is_null());

    let (code, detail) = app.get_json(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(detail["jobId"], job_id);
    assert_eq!(detail["orgId"], ORG_ID);
    assert_eq!(detail["orgName"], "Acme");

    // Both validation rules arrive even though the org pages them.
    let rules = detail["validationRules"].as_array().unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(detail["validationObjectNames"], json!(["Account", "Contact"]));
    let phone = rules.iter().find(|r| r["name"] == "Require_Phone").unwrap();
    assert_eq!(phone["enabled"], true);
    assert_eq!(phone["fullName"], "Account.Require_Phone");
    assert_eq!(phone["errorConditionFormula"], "ISBLANK(Phone)");

    let workflows = detail["workflowRules"].as_array().unwrap();
    assert_eq!(workflows.len(), 1);
    assert_eq!(workflows[0]["triggerType"], "onCreateOnly");
    assert_eq!(detail["workflowObjectNames"], json!(["Account"]));

    // Deleted triggers are not offered for review.
    let triggers = detail["triggers"].as_array().unwrap();
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0]["name"], "AccountTrigger");
    assert_eq!(triggers[0]["apiVersion"], "59.0");

    app.shutdown().await;
}

#[tokio::test]
async fn test_fetch_with_rejected_session_ends_in_error() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;

    let mut credentials = org.credentials();
    credentials["accessToken"] = json!("00D5g000004Fa1b!expired");
    let (status, body) = app.post_json("/api/v1/jobs", &credentials).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let status = app
        .wait_for_terminal(body["statusUrl"].as_str().unwrap())
        .await;
    assert_eq!(status["status"], "Error");
    let error = status["error"].as_str().unwrap();
    assert!(error.contains("Authentication failed"), "{}", error);
    assert!(!error.contains("00D5g000004Fa1b!"), "token leaked: {}", error);

    app.shutdown().await;
}

#[tokio::test]
async fn test_fetch_from_unavailable_org_ends_in_error() {
    let org = FakeOrg::start().await;
    org.set_query_failure(StatusCode::SERVICE_UNAVAILABLE);
    let app = TestApp::new().await;

    let job_id = app.create_job(&org).await;
    let status = app
        .wait_for_terminal(&format!("/api/v1/jobs/{}/status", job_id))
        .await;

    assert_eq!(status["status"], "Error");
    assert!(status["error"].as_str().unwrap().contains("Network failure"));

    // Nothing is stored for a failed fetch.
    assert!(org.data.lock().unwrap().query_count >= 2);
    let (_, detail) = app.get_json(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(detail["validationRules"], json!([]));
    assert_eq!(detail["triggers"], json!([]));

    app.shutdown().await;
}

// ============================================================================
// Lookup Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_job_returns_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app
        .get_json("/api/v1/jobs/job_doesnotexist0000000000000000000/status")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = app
        .get_json("/api/v1/jobs/job_doesnotexist0000000000000000000")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn test_jobs_are_isolated_from_each_other() {
    let org = FakeOrg::start().await;
    let app = TestApp::new().await;

    let first = app.fetched_job(&org).await;
    let second = app.fetched_job(&org).await;
    assert_ne!(first, second);

    let (_, first_detail) = app.get_json(&format!("/api/v1/jobs/{}", first)).await;
    let (_, second_detail) = app.get_json(&format!("/api/v1/jobs/{}", second)).await;

    let first_rule = record_id(&first_detail, "validationRules", "Require_Phone");
    let second_rule = record_id(&second_detail, "validationRules", "Require_Phone");
    assert_ne!(first_rule, second_rule);

    app.shutdown().await;
}

// ============================================================================
// Health Tests
// ============================================================================

#[tokio::test]
async fn test_health_reports_memory_store() {
    let app = TestApp::new().await;

    let (status, body) = app.get_json("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["backend"], "memory");

    let (status, body) = app.get_json("/api/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, _) = app.get_json("/api/health/ready").await;
    assert_eq!(status, StatusCode::OK);

    app.shutdown().await;
}
