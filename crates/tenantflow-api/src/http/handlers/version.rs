//! Workflow version handlers: publish, list, inspect and activate.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use tenantflow_types::error::EngineError;
use tenantflow_types::workflow::{PublishRequest, StepDefinition, TriggerSpec, WorkflowVersion};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::state::AppState;

/// Body of a publish request. The workflow id comes from the path and the
/// author from the API key.
#[derive(Debug, Deserialize)]
pub struct PublishBody {
    pub company_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger: Option<TriggerSpec>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub change_notes: Option<String>,
    #[serde(default)]
    pub activate: bool,
}

/// POST /api/v1/workflows/{workflow_id}/versions - Publish a new version.
pub async fn publish_version(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(workflow_id): Path<String>,
    body: Result<Json<PublishBody>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowVersion>), AppError> {
    let Json(body) = body?;
    let request = PublishRequest {
        workflow_id,
        company_id: body.company_id,
        name: body.name,
        description: body.description,
        trigger: body.trigger,
        steps: body.steps,
        change_notes: body.change_notes,
        activate: body.activate,
        created_by: auth.owner_email,
    };

    let version = state.version_manager.publish(request).await?;
    Ok((StatusCode::CREATED, Json(version)))
}

/// GET /api/v1/workflows/{workflow_id}/versions - Version history, oldest first.
pub async fn list_versions(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(workflow_id): Path<String>,
) -> Result<Json<Vec<WorkflowVersion>>, AppError> {
    let versions = state.version_manager.list_versions(&workflow_id).await?;
    Ok(Json(versions))
}

/// GET /api/v1/workflows/{workflow_id}/versions/active - The live version.
pub async fn active_version(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(workflow_id): Path<String>,
) -> Result<Json<WorkflowVersion>, AppError> {
    let version = state
        .version_manager
        .active_version(&workflow_id)
        .await?
        .ok_or_else(|| {
            EngineError::NotFound(format!("active version of workflow '{workflow_id}'"))
        })?;
    Ok(Json(version))
}

/// POST /api/v1/workflows/{workflow_id}/versions/{n}/activate - Roll back or forward.
pub async fn activate_version(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((workflow_id, version_number)): Path<(String, String)>,
) -> Result<Json<WorkflowVersion>, AppError> {
    let version_number: i64 = version_number
        .parse()
        .map_err(|_| AppError::Validation(format!("invalid version number: '{version_number}'")))?;

    let version = state
        .version_manager
        .activate(&workflow_id, version_number, &auth.owner_email)
        .await?;
    Ok(Json(version))
}
