//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "catalystd".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Deployment creation request
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub project_id: i64,
}

/// Create a deployment row and submit it for processing.
///
/// Returns 202 once the row is pending and enqueued; progress is observable
/// through the deployment resource.
pub async fn create_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateDeploymentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let project = state
        .store
        .get_project(request.project_id)
        .await
        .map_err(|e| {
            error!("Project lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let record = state
        .store
        .create_deployment(project.id)
        .await
        .map_err(|e| {
            error!("Deployment creation failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    state.queue.enqueue(record.id.clone()).map_err(|e| {
        error!("Deployment {} could not be enqueued: {}", record.id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// Fetch a deployment by id.
pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let record = state
        .store
        .get_deployment(&deployment_id)
        .await
        .map_err(|e| {
            error!("Deployment lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(record))
}
