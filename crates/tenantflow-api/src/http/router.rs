//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Inbound events (unauthenticated)
        .route(
            "/webhooks/workflow-trigger",
            post(handlers::webhook::workflow_trigger),
        )
        // Versions
        .route(
            "/workflows/{workflow_id}/versions",
            post(handlers::version::publish_version).get(handlers::version::list_versions),
        )
        .route(
            "/workflows/{workflow_id}/versions/active",
            get(handlers::version::active_version),
        )
        .route(
            "/workflows/{workflow_id}/versions/{n}/activate",
            post(handlers::version::activate_version),
        )
        .route(
            "/workflows/{workflow_id}/triggers",
            get(handlers::trigger::list_triggers),
        )
        .route(
            "/workflows/{workflow_id}/executions",
            get(handlers::execution::list_executions),
        )
        // Triggers
        .route("/triggers", post(handlers::trigger::create_trigger))
        .route("/triggers/{id}", get(handlers::trigger::get_trigger))
        .route(
            "/triggers/{id}/deactivate",
            post(handlers::trigger::deactivate_trigger),
        )
        // Executions
        .route("/executions/{id}", get(handlers::execution::get_execution))
        .route(
            "/executions/{id}/steps/{step_id}/complete",
            post(handlers::execution::complete_step),
        )
        .route(
            "/executions/{id}/approvals/{approval_id}",
            post(handlers::execution::resolve_approval),
        )
        .route("/executions/{id}/fail", post(handlers::execution::fail_execution))
        .route(
            "/executions/{id}/cancel",
            post(handlers::execution::cancel_execution),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
