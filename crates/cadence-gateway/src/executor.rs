//! Default action attached to tasks registered over HTTP.

use cadence_scheduler::{HandlerResult, TaskHandler, TaskInvocation};
use tracing::info;

/// Logs every fire. HTTP clients cannot ship code, so a task registered through
/// the gateway only records that it ran, with its type and parameters.
pub struct LogTaskHandler;

impl TaskHandler for LogTaskHandler {
    fn run(&self, invocation: &TaskInvocation) -> HandlerResult {
        let parameters = serde_json::to_string(&invocation.parameters)?;
        info!(
            task_id = %invocation.task_id,
            task_type = %invocation.task_type,
            %parameters,
            fired_at = %invocation.fired_at.to_rfc3339(),
            "executing task"
        );
        Ok(())
    }
}
