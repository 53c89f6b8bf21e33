//! Scheduler control routes.
//!
//! `POST /scheduler/tasks`, `DELETE /scheduler/tasks/{task_id}`,
//! `GET /scheduler/tasks` and `GET /scheduler/tasks/detail`.
//! Every task added here runs [`LogTaskHandler`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cadence_scheduler::{Registration, TaskHandler, TaskSummary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::app::AppState;
use crate::executor::LogTaskHandler;

#[derive(Deserialize)]
pub struct AddTaskRequest {
    pub task_id: String,
    /// `"HH:MM"` or `"every N minutes|hours|days"`.
    pub interval: String,
    pub task_type: String,
    pub parameters: Map<String, Value>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Serialize)]
pub struct TaskListResponse {
    pub tasks: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct TaskDetailResponse {
    pub tasks: Vec<TaskSummary>,
    pub running: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, detail: String) -> ApiError {
    (status, Json(ErrorResponse { detail }))
}

/// POST /scheduler/tasks: register (or replace) a task.
pub async fn add_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddTaskRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let handler: Arc<dyn TaskHandler> = Arc::new(LogTaskHandler);
    let registration = state
        .scheduler
        .try_add_task(
            &req.task_id,
            handler,
            &req.interval,
            &req.task_type,
            req.parameters,
        )
        .map_err(|e| {
            tracing::warn!(task_id = %req.task_id, code = e.code(), "add task rejected: {e}");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to add task: {e}"),
            )
        })?;

    if registration == Registration::Replaced {
        tracing::info!(task_id = %req.task_id, "existing task replaced");
    }
    Ok(Json(StatusResponse {
        status: "success",
        message: format!("Task {} added successfully", req.task_id),
    }))
}

/// DELETE /scheduler/tasks/{task_id}
pub async fn remove_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !state.scheduler.remove_task(&task_id) {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Task {task_id} not found"),
        ));
    }
    Ok(Json(StatusResponse {
        status: "success",
        message: format!("Task {task_id} removed successfully"),
    }))
}

/// GET /scheduler/tasks: `task_id → trigger description`.
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        tasks: state.scheduler.get_tasks(),
    })
}

/// GET /scheduler/tasks/detail: full summaries plus loop state.
pub async fn task_details(State(state): State<Arc<AppState>>) -> Json<TaskDetailResponse> {
    Json(TaskDetailResponse {
        tasks: state.scheduler.snapshot(),
        running: state.scheduler.is_running(),
    })
}
