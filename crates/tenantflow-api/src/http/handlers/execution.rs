//! Execution inspection and state transition handlers.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use tenantflow_types::execution::{ApprovalDecision, WorkflowExecution};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::handlers::{optional_body, parse_id};
use crate::state::AppState;

/// Query parameters for listing executions.
#[derive(Debug, Deserialize)]
pub struct ListExecutionsQuery {
    /// Maximum number of executions to return (default 20).
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ApprovalBody {
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailBody {
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// GET /api/v1/executions/{id}
pub async fn get_execution(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<WorkflowExecution>, AppError> {
    let id = parse_id(&id, "execution")?;
    Ok(Json(state.execution_tracker.get(&id).await?))
}

/// GET /api/v1/workflows/{workflow_id}/executions - Newest first.
pub async fn list_executions(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(workflow_id): Path<String>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<Vec<WorkflowExecution>>, AppError> {
    let limit = query.limit.clamp(1, 500);
    Ok(Json(
        state.execution_tracker.list(&workflow_id, limit).await?,
    ))
}

/// POST /api/v1/executions/{id}/steps/{step_id}/complete
///
/// The optional body is the step's output object, merged into the
/// execution's variables.
pub async fn complete_step(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path((id, step_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<WorkflowExecution>, AppError> {
    let id = parse_id(&id, "execution")?;
    let output: Value = optional_body::<Option<Value>>(&body)?.unwrap_or_else(|| json!({}));
    let execution = state
        .execution_tracker
        .complete_step(&id, &step_id, output)
        .await?;
    Ok(Json(execution))
}

/// POST /api/v1/executions/{id}/approvals/{approval_id}
pub async fn resolve_approval(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, approval_id)): Path<(String, String)>,
    body: Result<Json<ApprovalBody>, JsonRejection>,
) -> Result<Json<WorkflowExecution>, AppError> {
    let id = parse_id(&id, "execution")?;
    let approval_id = parse_id(&approval_id, "approval")?;
    let Json(body) = body?;
    let execution = state
        .execution_tracker
        .resolve_approval(&id, &approval_id, body.decision, &auth.owner_email, body.comment)
        .await?;
    Ok(Json(execution))
}

/// POST /api/v1/executions/{id}/fail
pub async fn fail_execution(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
    body: Result<Json<FailBody>, JsonRejection>,
) -> Result<Json<WorkflowExecution>, AppError> {
    let id = parse_id(&id, "execution")?;
    let Json(body) = body?;
    if body.error.trim().is_empty() {
        return Err(AppError::Validation("'error' must not be empty".to_string()));
    }
    let execution = state
        .execution_tracker
        .fail(&id, &body.error, &auth.owner_email)
        .await?;
    Ok(Json(execution))
}

/// POST /api/v1/executions/{id}/cancel
pub async fn cancel_execution(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<WorkflowExecution>, AppError> {
    let id = parse_id(&id, "execution")?;
    let body: CancelBody = optional_body(&body)?;
    let execution = state
        .execution_tracker
        .cancel(&id, body.reason.as_deref(), &auth.owner_email)
        .await?;
    Ok(Json(execution))
}
