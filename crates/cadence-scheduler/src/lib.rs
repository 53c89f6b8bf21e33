//! `cadence-scheduler`: in-memory recurring task scheduler on a tokio background loop.
//!
//! # Overview
//!
//! Tasks live in a job table owned by a [`Scheduler`]. Once started, the
//! scheduler polls the table every tick (1 s by default) and fires any task
//! whose `next_run` has arrived, then advances `next_run` by the task's trigger.
//! Tasks can be added, replaced, removed and listed while the loop runs.
//!
//! # Interval specs
//!
//! | Spec                    | Trigger                                     |
//! |-------------------------|---------------------------------------------|
//! | `every 5 minutes`       | `Interval`, every 5 minutes from now        |
//! | `every 2 hours`         | `Interval`, every 2 hours from now          |
//! | `every 1 day`           | `Interval`, every 24 hours from now         |
//! | `09:00` / `09:00:30`    | `DailyAt`, once a day at that wall-clock time |
//!
//! Nothing is persisted: a restart loses every registration.

pub mod clock;
pub mod engine;
pub mod error;
pub mod handler;
pub mod schedule;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use handler::{HandlerResult, TaskHandler};
pub use types::{IntervalUnit, Registration, TaskInvocation, TaskSummary, Trigger};
