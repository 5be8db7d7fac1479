//! Task handlers: creation, listing, records and operator control.

use super::{
    CreateTaskResponse, DeleteTaskQuery, ListTasksQuery, RequeueRequest, task_id_from_path,
};
use crate::api::AppState;
use crate::error::{ApiError, Error};
use crate::types::{NewTask, Record, RequeueSummary, Task};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /tasks - Create a task from parsed records
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body = crate::types::NewTask,
    responses(
        (status = 201, description = "Task created", body = CreateTaskResponse),
        (status = 400, description = "Invalid provider configuration"),
        (status = 503, description = "Shutting down"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    Json(new_task): Json<NewTask>,
) -> Result<impl IntoResponse, Error> {
    let task_id = state.translator.create_task(new_task).await?;
    Ok((StatusCode::CREATED, Json(CreateTaskResponse { task_id })))
}

/// GET /tasks - List tasks, newest first
#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    params(
        ("include_deleted" = Option<bool>, Query, description = "Include soft-deleted tasks (default: false)")
    ),
    responses(
        (status = 200, description = "Tasks with provider keys masked", body = Vec<crate::types::Task>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, Error> {
    let tasks = state.translator.list_tasks(query.include_deleted).await?;
    Ok(Json(tasks.iter().map(Task::redacted).collect()))
}

/// GET /tasks/:date/:seq - Get a single task
#[utoipa::path(
    get,
    path = "/tasks/{date}/{seq}",
    tag = "tasks",
    params(
        ("date" = String, Path, description = "Date partition (YYYY-MM-DD)"),
        ("seq" = String, Path, description = "Per-day sequence number")
    ),
    responses(
        (status = 200, description = "Task with provider keys masked", body = crate::types::Task),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path((date, seq)): Path<(String, String)>,
) -> Result<Json<Task>, Error> {
    let task = state
        .translator
        .get_task(&task_id_from_path(&date, &seq))
        .await?;
    Ok(Json(task.redacted()))
}

/// GET /tasks/:date/:seq/records - Get a task's records in index order
#[utoipa::path(
    get,
    path = "/tasks/{date}/{seq}/records",
    tag = "tasks",
    params(
        ("date" = String, Path, description = "Date partition (YYYY-MM-DD)"),
        ("seq" = String, Path, description = "Per-day sequence number")
    ),
    responses(
        (status = 200, description = "Records in index order", body = Vec<crate::types::Record>),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_records(
    State(state): State<AppState>,
    Path((date, seq)): Path<(String, String)>,
) -> Result<Json<Vec<Record>>, Error> {
    let records = state
        .translator
        .get_records(&task_id_from_path(&date, &seq))
        .await?;
    Ok(Json(records))
}

/// PUT /tasks/:date/:seq/pause - Pause a running task
#[utoipa::path(
    put,
    path = "/tasks/{date}/{seq}/pause",
    tag = "tasks",
    params(
        ("date" = String, Path, description = "Date partition (YYYY-MM-DD)"),
        ("seq" = String, Path, description = "Per-day sequence number")
    ),
    responses(
        (status = 204, description = "Task paused (in-flight records still finish)"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task is not running"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn pause_task(
    State(state): State<AppState>,
    Path((date, seq)): Path<(String, String)>,
) -> Result<StatusCode, Error> {
    state
        .translator
        .pause(&task_id_from_path(&date, &seq))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /tasks/:date/:seq/resume - Return a paused task to the pending pool
#[utoipa::path(
    put,
    path = "/tasks/{date}/{seq}/resume",
    tag = "tasks",
    params(
        ("date" = String, Path, description = "Date partition (YYYY-MM-DD)"),
        ("seq" = String, Path, description = "Per-day sequence number")
    ),
    responses(
        (status = 204, description = "Task resumed"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task is not paused"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn resume_task(
    State(state): State<AppState>,
    Path((date, seq)): Path<(String, String)>,
) -> Result<StatusCode, Error> {
    state
        .translator
        .resume(&task_id_from_path(&date, &seq))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /tasks/:date/:seq/retry-failed - Requeue a task's failed records
#[utoipa::path(
    post,
    path = "/tasks/{date}/{seq}/retry-failed",
    tag = "tasks",
    params(
        ("date" = String, Path, description = "Date partition (YYYY-MM-DD)"),
        ("seq" = String, Path, description = "Per-day sequence number")
    ),
    request_body(content = RequeueRequest, description = "Optional replacement providers; the body may be empty"),
    responses(
        (status = 200, description = "Failed records requeued", body = crate::types::RequeueSummary),
        (status = 400, description = "Malformed body or invalid providers"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task is executing or in a state that cannot be requeued"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn retry_failed_records(
    State(state): State<AppState>,
    Path((date, seq)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request = match parse_requeue_body(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    requeue_response(
        state
            .translator
            .retry_failed(&task_id_from_path(&date, &seq), request.providers)
            .await,
    )
}

/// POST /tasks/:date/:seq/reset - Clear every record and requeue the task
#[utoipa::path(
    post,
    path = "/tasks/{date}/{seq}/reset",
    tag = "tasks",
    params(
        ("date" = String, Path, description = "Date partition (YYYY-MM-DD)"),
        ("seq" = String, Path, description = "Per-day sequence number")
    ),
    request_body(content = RequeueRequest, description = "Optional replacement providers; the body may be empty"),
    responses(
        (status = 200, description = "Task reset", body = crate::types::RequeueSummary),
        (status = 400, description = "Malformed body or invalid providers"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task is executing or in a state that cannot be requeued"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn reset_task(
    State(state): State<AppState>,
    Path((date, seq)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request = match parse_requeue_body(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    requeue_response(
        state
            .translator
            .reset(&task_id_from_path(&date, &seq), request.providers)
            .await,
    )
}

/// DELETE /tasks/:date/:seq - Soft-delete, or purge with `permanent=true`
#[utoipa::path(
    delete,
    path = "/tasks/{date}/{seq}",
    tag = "tasks",
    params(
        ("date" = String, Path, description = "Date partition (YYYY-MM-DD)"),
        ("seq" = String, Path, description = "Per-day sequence number"),
        ("permanent" = Option<bool>, Query, description = "Remove the task and its records (default: false)")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task is still executing (permanent delete only)"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path((date, seq)): Path<(String, String)>,
    Query(query): Query<DeleteTaskQuery>,
) -> Result<StatusCode, Error> {
    let id = task_id_from_path(&date, &seq);
    if query.permanent {
        state.translator.purge_task(&id).await?;
    } else {
        state.translator.delete_task(&id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// An empty body means "keep the task's providers"
fn parse_requeue_body(body: &[u8]) -> Result<RequeueRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RequeueRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::validation(format!("invalid request body: {e}")))
}

fn requeue_response(result: crate::Result<RequeueSummary>) -> Response {
    match result {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => e.into_response(),
    }
}
