use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "scheduler_running": state.scheduler.is_running(),
        "tasks": state.scheduler.task_count(),
        "tick_interval_ms": state.config.scheduler.tick_interval_ms,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
