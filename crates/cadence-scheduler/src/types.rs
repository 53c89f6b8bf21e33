use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::handler::TaskHandler;

/// Unit of an `every N <unit>` trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    /// Singular noun, used when the interval value is 1.
    fn singular(&self) -> &'static str {
        match self {
            IntervalUnit::Minutes => "minute",
            IntervalUnit::Hours => "hour",
            IntervalUnit::Days => "day",
        }
    }
}

impl std::fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntervalUnit::Minutes => "minutes",
            IntervalUnit::Hours => "hours",
            IntervalUnit::Days => "days",
        };
        write!(f, "{s}")
    }
}

/// Defines when a task becomes eligible to fire. Parsed once at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire every `value` units, counted from registration and then from each fire.
    Interval { unit: IntervalUnit, value: u32 },

    /// Fire once per day at the given wall-clock time.
    DailyAt { time: NaiveTime },
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Interval { unit, value: 1 } => write!(f, "every 1 {}", unit.singular()),
            Trigger::Interval { unit, value } => write!(f, "every {value} {unit}"),
            Trigger::DailyAt { time } if time.second() == 0 => {
                write!(f, "daily at {}", time.format("%H:%M"))
            }
            Trigger::DailyAt { time } => write!(f, "daily at {}", time.format("%H:%M:%S")),
        }
    }
}

/// Keyword bundle handed to a task handler on every fire.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInvocation {
    pub task_id: String,
    pub task_type: String,
    /// Caller-supplied parameters, forwarded verbatim.
    pub parameters: Map<String, Value>,
    /// Scheduler clock reading at the start of the tick that fired the task.
    pub fired_at: DateTime<Utc>,
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    /// An existing task with the same id was replaced. Not an error.
    Replaced,
}

/// Read-only view of a registered task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub task_type: String,
    pub description: String,
    pub trigger: Trigger,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub failure_count: u64,
    pub created_at: DateTime<Utc>,
}

/// A live entry in the job table.
pub(crate) struct Job {
    pub task_id: String,
    pub trigger: Trigger,
    pub handler: Arc<dyn TaskHandler>,
    pub task_type: String,
    pub parameters: Map<String, Value>,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub failure_count: u64,
    pub created_at: DateTime<Utc>,
    /// Bumped on every registration so a replaced job is never confused with its successor.
    pub generation: u64,
}

impl Job {
    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            task_type: self.task_type.clone(),
            description: self.trigger.to_string(),
            trigger: self.trigger.clone(),
            next_run: self.next_run,
            last_run: self.last_run,
            run_count: self.run_count,
            failure_count: self.failure_count,
            created_at: self.created_at,
        }
    }

    pub fn invocation(&self, fired_at: DateTime<Utc>) -> TaskInvocation {
        TaskInvocation {
            task_id: self.task_id.clone(),
            task_type: self.task_type.clone(),
            parameters: self.parameters.clone(),
            fired_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn interval_descriptions() {
        let five = Trigger::Interval {
            unit: IntervalUnit::Minutes,
            value: 5,
        };
        let one = Trigger::Interval {
            unit: IntervalUnit::Hours,
            value: 1,
        };
        let two = Trigger::Interval {
            unit: IntervalUnit::Days,
            value: 2,
        };
        assert_eq!(five.to_string(), "every 5 minutes");
        assert_eq!(one.to_string(), "every 1 hour");
        assert_eq!(two.to_string(), "every 2 days");
    }

    #[test]
    fn daily_descriptions_hide_zero_seconds() {
        let plain = Trigger::DailyAt {
            time: time(14, 30, 0),
        };
        let precise = Trigger::DailyAt {
            time: time(7, 5, 15),
        };
        assert_eq!(plain.to_string(), "daily at 14:30");
        assert_eq!(precise.to_string(), "daily at 07:05:15");
    }

    #[test]
    fn trigger_serializes_with_kind_tag() {
        let t = Trigger::Interval {
            unit: IntervalUnit::Minutes,
            value: 5,
        };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["kind"], "interval");
        assert_eq!(json["unit"], "minutes");
        assert_eq!(json["value"], 5);
    }
}
