//! System handlers: health, scheduler status, OpenAPI.

use crate::api::AppState;
use crate::types::SchedulerStatus;
use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /scheduler - Scheduler bookkeeping snapshot
#[utoipa::path(
    get,
    path = "/scheduler",
    tag = "system",
    responses(
        (status = 200, description = "Running total, per-provider load and scheduled tasks", body = crate::types::SchedulerStatus)
    )
)]
pub async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.translator.scheduler_status().await)
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3.1 specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}
