//! Inbound trigger webhook.
//!
//! External systems post events here; the body addresses a trigger and
//! carries the event fields its conditions are evaluated against.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use tenantflow_types::execution::TriggerRequest;

use crate::http::error::AppError;
use crate::state::AppState;

/// Response body for a handled trigger event.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn required_str<'a>(body: &'a Value, key: &str) -> Result<&'a str, AppError> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("'{key}' is required")))
}

/// Split an event body into its routing fields and the payload.
///
/// The payload is the whole body, so conditions may reference any field.
pub(crate) fn to_trigger_request(body: Value) -> Result<TriggerRequest, AppError> {
    if !body.is_object() {
        return Err(AppError::Validation("body must be a JSON object".to_string()));
    }
    let workflow_id = required_str(&body, "workflow_id")?.to_string();
    let company_id = required_str(&body, "company_id")?.to_string();
    let raw_trigger = required_str(&body, "trigger_id")?;
    let trigger_id = super::parse_id(raw_trigger, "trigger")?;

    Ok(TriggerRequest {
        workflow_id,
        trigger_id,
        company_id,
        payload: body,
    })
}

/// POST /api/v1/webhooks/workflow-trigger - Handle a trigger event.
pub async fn workflow_trigger(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<WebhookResponse>, AppError> {
    let Json(body) = body?;
    let request = to_trigger_request(body)?;

    tracing::debug!(
        workflow_id = %request.workflow_id,
        trigger_id = %request.trigger_id,
        "trigger webhook received"
    );

    let outcome = state.trigger_evaluator.handle(request).await?;

    Ok(Json(WebhookResponse {
        success: true,
        executed: outcome.executed,
        execution_id: outcome.execution_id,
        reason: outcome.reason,
    }))
}
