//! Routes and handlers for the `/tasks` resource.
//!
//! Status reads go through the scheduler, which consults the task store;
//! records therefore reflect exactly what WebSocket subscribers see.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use inksketch_core::error::CoreError;
use inksketch_core::task::{TaskRecord, TaskStatus};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Query parameters for listing tasks.
#[derive(Deserialize)]
pub struct TaskListQuery {
    /// Keep only records in this status.
    pub status: Option<TaskStatus>,
}

/// Response payload for a cancellation request.
#[derive(Serialize)]
pub struct CancelResponse {
    /// Whether a live task was found and signalled. `false` means the id
    /// was unknown to this process (already settled, or never submitted
    /// here).
    pub cancelled: bool,
}

/// GET /api/v1/tasks
///
/// List known task records, newest first. Supports an optional `status`
/// query parameter (`pending`, `running`, `completed`, `failed`,
/// `timeout`, `cancelled`).
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<Json<Vec<TaskRecord>>> {
    let records = state.scheduler.list(params.status).await?;
    Ok(Json(records))
}

/// GET /api/v1/tasks/{id}
///
/// Get a single task record by ID. Returns 404 when the record does not
/// exist (never created, or expired out of the store).
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<TaskRecord>> {
    let record = state
        .scheduler
        .status(&task_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        }))?;

    Ok(Json(record))
}

/// POST /api/v1/tasks/{id}/cancel
///
/// Request cancellation of a pending or running task. Best-effort and
/// idempotent: cancelling an unknown or already-settled task reports
/// `cancelled: false` rather than an error.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<CancelResponse> {
    let cancelled = state.scheduler.cancel(&task_id).await;

    if cancelled {
        tracing::info!(task_id = %task_id, "Task cancellation requested");
    }

    Json(CancelResponse { cancelled })
}

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /                -> list_tasks
/// GET    /{id}            -> get_task
/// POST   /{id}/cancel     -> cancel_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks))
        .route("/{id}", get(get_task))
        .route("/{id}/cancel", post(cancel_task))
}
