//! Durable schedule state machine for satchel.
//!
//! This crate provides the coordination core behind scheduled backups:
//! - One persisted state record per named schedule, with corruption recovery
//! - Cron-based recurrence in the host's local timezone
//! - Stale job detection (dead, recycled, or hung background processes)
//! - Overdue scanning that ranks due schedules by urgency
//! - Lifecycle transitions around each execution attempt
//! - A detached background job launcher and an advisory check lock

mod error;
mod launch;
mod process;
mod recurrence;
mod scheduler;
mod stale;
mod store;
mod types;

pub use error::SchedulerError;
pub use launch::{CHECK_LOCK_FILE, CheckLock, job_command, spawn_background_job};
pub use process::{ProcessInspector, SystemInspector};
pub use recurrence::next_after;
pub use scheduler::{Scheduler, ScheduleReport};
pub use stale::StaleJobDetector;
pub use store::{FileStateStore, MemoryStateStore, StateStore, default_state_dir};
pub use types::{Clock, Overdue, RunStatus, ScheduleDef, ScheduleState, SystemClock};
