use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Tasks are keyed by id; an empty id can never be addressed again.
    #[error("Task id must not be empty")]
    EmptyTaskId,

    /// `every N <unit>` named a unit other than minutes, hours or days.
    #[error("Unsupported time unit: {unit}")]
    UnsupportedUnit { unit: String },

    /// The interval spec is neither a valid `every N <unit>` nor a valid `HH:MM`.
    #[error("Invalid interval: {0}")]
    TriggerParse(String),

    /// No task with the given id exists in the table.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    /// A task callback returned an error or panicked while firing.
    #[error("Task {id} failed: {reason}")]
    CallbackFailure { id: String, reason: String },
}

impl SchedulerError {
    /// Short error code string, suitable for API responses and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::EmptyTaskId => "EMPTY_TASK_ID",
            SchedulerError::UnsupportedUnit { .. } => "UNSUPPORTED_UNIT",
            SchedulerError::TriggerParse(_) => "TRIGGER_PARSE_ERROR",
            SchedulerError::TaskNotFound { .. } => "TASK_NOT_FOUND",
            SchedulerError::CallbackFailure { .. } => "CALLBACK_FAILURE",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
