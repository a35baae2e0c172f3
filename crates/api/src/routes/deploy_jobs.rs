//! Deploy job endpoint handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::{DeployJobResponse, StatusResponse};

use crate::app::AppState;
use crate::error::ApiError;

/// Poll a deploy job.
///
/// GET /api/v1/deploy-jobs/:deploy_job_id/status
pub async fn get_deploy_job_status(
    State(state): State<AppState>,
    Path(deploy_job_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(state.jobs.get_deploy_status(deploy_job_id).await?))
}

/// GET /api/v1/deploy-jobs/:deploy_job_id
pub async fn get_deploy_job(
    State(state): State<AppState>,
    Path(deploy_job_id): Path<i64>,
) -> Result<Json<DeployJobResponse>, ApiError> {
    Ok(Json(state.jobs.deploy_job_detail(deploy_job_id).await?))
}
