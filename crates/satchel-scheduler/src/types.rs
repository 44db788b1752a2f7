//! Scheduler types.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::recurrence::next_after;

/// A named schedule definition as provided by configuration.
///
/// The core only needs the name and the optional recurrence rule; profile
/// membership stays with the configuration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDef {
    /// Unique schedule name.
    pub name: String,
    /// Cron expression (5 fields, local time); `None` means manual-only.
    pub recurrence: Option<String>,
}

impl ScheduleDef {
    pub fn new(name: impl Into<String>, recurrence: Option<String>) -> Self {
        Self {
            name: name.into(),
            recurrence,
        }
    }
}

/// Persisted state for one schedule.
///
/// One record exists per schedule name, created lazily on first access and
/// always read-modify-written as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleState {
    /// Schedule name from configuration (immutable key).
    pub schedule: String,
    /// Completion time of the last successful run.
    pub last_run: Option<DateTime<Local>>,
    /// Next due execution time; `None` forever for manual schedules.
    pub next_run: Option<DateTime<Local>>,
    /// Current status with the attempt fields valid for it.
    #[serde(flatten)]
    pub status: RunStatus,
}

/// Current status of a schedule.
///
/// Each variant carries exactly the fields that are meaningful in that
/// state, so a "running" record without a pid cannot be constructed. The
/// flattened tag keeps the on-disk record flat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting for the next due time (or for a manual run).
    Pending,
    /// A background job is executing.
    Running {
        /// Process id of the in-flight job.
        pid: u32,
        /// When the job started.
        started_at: DateTime<Local>,
    },
    /// The last attempt completed successfully.
    Success {
        /// When the attempt started (absent only for legacy records).
        started_at: Option<DateTime<Local>>,
        /// When the attempt finished.
        finished_at: DateTime<Local>,
    },
    /// The last attempt failed; retried at the next scheduled slot.
    Failed {
        /// When the attempt started. A record recovered from an
        /// inconsistent running state may not have one.
        started_at: Option<DateTime<Local>>,
        /// When the attempt finished (or was declared stale).
        finished_at: DateTime<Local>,
    },
}

impl RunStatus {
    /// Short lowercase label matching the serialized tag.
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running { .. } => "running",
            RunStatus::Success { .. } => "success",
            RunStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunStatus::Running { .. })
    }

    /// Pid of the in-flight job, if any.
    pub fn pid(&self) -> Option<u32> {
        match self {
            RunStatus::Running { pid, .. } => Some(*pid),
            _ => None,
        }
    }

    /// Start time of the current or last attempt, if recorded.
    pub fn started_at(&self) -> Option<DateTime<Local>> {
        match self {
            RunStatus::Pending => None,
            RunStatus::Running { started_at, .. } => Some(*started_at),
            RunStatus::Success { started_at, .. } | RunStatus::Failed { started_at, .. } => {
                *started_at
            }
        }
    }

    /// Finish time of the last attempt, if any.
    pub fn finished_at(&self) -> Option<DateTime<Local>> {
        match self {
            RunStatus::Success { finished_at, .. } | RunStatus::Failed { finished_at, .. } => {
                Some(*finished_at)
            }
            _ => None,
        }
    }
}

impl ScheduleState {
    /// Build the initial record for a schedule, computing `next_run` from
    /// `now` when the schedule is recurring.
    pub fn fresh(
        name: &str,
        recurrence: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<Self, SchedulerError> {
        let next_run = match recurrence {
            Some(expr) => Some(next_after(expr, now)?),
            None => None,
        };

        Ok(Self {
            schedule: name.to_string(),
            last_run: None,
            next_run,
            status: RunStatus::Pending,
        })
    }

    /// Minutes elapsed past `next_run`, when that instant has passed.
    pub fn overdue_minutes(&self, now: DateTime<Local>) -> Option<f64> {
        let next_run = self.next_run?;
        if now >= next_run {
            Some((now - next_run).num_seconds() as f64 / 60.0)
        } else {
            None
        }
    }
}

/// One entry in the overdue scan result.
#[derive(Debug, Clone, PartialEq)]
pub struct Overdue {
    /// Schedule name.
    pub schedule: String,
    /// Minutes elapsed since the schedule's due time.
    pub overdue_minutes: f64,
}

/// Source of "now" for the scheduler, injectable for tests.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
