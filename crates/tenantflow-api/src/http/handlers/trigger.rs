//! Trigger registration handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use tenantflow_types::workflow::{CreateTriggerRequest, WorkflowTrigger};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::handlers::parse_id;
use crate::state::AppState;

/// POST /api/v1/triggers - Register an active trigger.
pub async fn create_trigger(
    State(state): State<AppState>,
    auth: Authenticated,
    body: Result<Json<CreateTriggerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowTrigger>), AppError> {
    let Json(request) = body?;
    let trigger = state
        .trigger_evaluator
        .create_trigger(request, &auth.owner_email)
        .await?;
    Ok((StatusCode::CREATED, Json(trigger)))
}

/// GET /api/v1/triggers/{id}
pub async fn get_trigger(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<WorkflowTrigger>, AppError> {
    let id = parse_id(&id, "trigger")?;
    Ok(Json(state.trigger_evaluator.get_trigger(&id).await?))
}

/// GET /api/v1/workflows/{workflow_id}/triggers
pub async fn list_triggers(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(workflow_id): Path<String>,
) -> Result<Json<Vec<WorkflowTrigger>>, AppError> {
    Ok(Json(state.trigger_evaluator.list_triggers(&workflow_id).await?))
}

/// POST /api/v1/triggers/{id}/deactivate
pub async fn deactivate_trigger(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<WorkflowTrigger>, AppError> {
    let id = parse_id(&id, "trigger")?;
    let trigger = state
        .trigger_evaluator
        .deactivate_trigger(&id, &auth.owner_email)
        .await?;
    Ok(Json(trigger))
}
