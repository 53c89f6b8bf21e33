use axum::{
    routing::{delete, get},
    Router,
};
use cadence_core::config::CadenceConfig;
use cadence_scheduler::Scheduler;
use std::sync::Arc;
use std::time::Instant;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: CadenceConfig,
    pub scheduler: Arc<Scheduler>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: CadenceConfig, scheduler: Arc<Scheduler>) -> Self {
        Self {
            config,
            scheduler,
            started_at: Instant::now(),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/scheduler/tasks",
            get(crate::http::scheduler::list_tasks).post(crate::http::scheduler::add_task),
        )
        .route(
            "/scheduler/tasks/detail",
            get(crate::http::scheduler::task_details),
        )
        .route(
            "/scheduler/tasks/{task_id}",
            delete(crate::http::scheduler::remove_task),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// State with a stopped scheduler on UTC and default config.
#[cfg(test)]
pub fn test_state() -> Arc<AppState> {
    let mut config = CadenceConfig::default();
    config.scheduler.utc_offset_minutes = Some(0);
    let scheduler = Arc::new(Scheduler::new(&config.scheduler));
    Arc::new(AppState::new(config, scheduler))
}
