//! The action a task runs when it fires.

use crate::types::TaskInvocation;

/// Result returned by a task handler. Any error type is accepted; it is logged
/// and counted, never propagated past the scheduler loop.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Work executed each time a task fires.
///
/// Handlers are synchronous and run one at a time on the scheduler's blocking
/// worker, so a slow handler delays the tasks behind it in the same tick.
pub trait TaskHandler: Send + Sync {
    fn run(&self, invocation: &TaskInvocation) -> HandlerResult;
}

impl<F> TaskHandler for F
where
    F: Fn(&TaskInvocation) -> HandlerResult + Send + Sync,
{
    fn run(&self, invocation: &TaskInvocation) -> HandlerResult {
        self(invocation)
    }
}
