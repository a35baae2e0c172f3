//! Fetch job endpoint handlers.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{
    CreateDeployJobResponse, CreateJobResponse, CredentialContext, JobDetailResponse,
    StatusResponse,
};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;

/// Start fetching metadata for the org the credentials belong to.
///
/// POST /api/v1/jobs
pub async fn create_job(
    State(state): State<AppState>,
    Json(credentials): Json<CredentialContext>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    credentials.validate()?;

    let job = state.jobs.create_fetch_job(&credentials).await?;
    Ok((StatusCode::ACCEPTED, Json(CreateJobResponse::from_job(&job))))
}

/// Poll a fetch job.
///
/// GET /api/v1/jobs/:job_id/status
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(state.jobs.get_job_status(&job_id).await?))
}

/// Fetched metadata of a job, for review.
///
/// GET /api/v1/jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobDetailResponse>, ApiError> {
    Ok(Json(state.jobs.job_detail(&job_id).await?))
}

/// Submit a selection of components to switch on or off.
///
/// POST /api/v1/jobs/:job_id/deploy/:metadata_type
///
/// The body is read raw: a selection that does not parse still creates a
/// deploy job, in `Error` status.
pub async fn create_deploy_job(
    State(state): State<AppState>,
    Path((job_id, metadata_type)): Path<(String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateDeployJobResponse>), ApiError> {
    let deploy_job = state
        .jobs
        .create_deploy_job(&job_id, &metadata_type, &body)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CreateDeployJobResponse::from_deploy_job(&deploy_job)),
    ))
}
