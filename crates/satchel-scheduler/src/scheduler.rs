//! Schedule coordination: overdue scanning and lifecycle transitions.

use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::process::ProcessInspector;
use crate::stale::StaleJobDetector;
use crate::store::StateStore;
use crate::types::{Clock, Overdue, RunStatus, ScheduleDef, ScheduleState, SystemClock};

/// The schedule coordinator.
///
/// Owns the state store and the stale job detector; every mutation goes
/// through a whole-record load→mutate→save cycle so a concurrent reader
/// always observes a self-consistent record.
pub struct Scheduler<S, P, C = SystemClock> {
    store: S,
    stale: StaleJobDetector<P>,
    clock: C,
}

/// Point-in-time status of one schedule, derived purely from its loaded
/// record plus "now".
#[derive(Debug, Clone)]
pub struct ScheduleReport {
    pub name: String,
    /// Cron expression, when the schedule is recurring.
    pub recurrence: Option<String>,
    pub state: ScheduleState,
    /// Minutes past the due time, when the schedule is overdue.
    pub overdue_minutes: Option<f64>,
}

impl<S, P> Scheduler<S, P, SystemClock>
where
    S: StateStore,
    P: ProcessInspector,
{
    pub fn new(store: S, inspector: P, stale_timeout_hours: i64) -> Self {
        Self::with_clock(store, inspector, stale_timeout_hours, SystemClock)
    }
}

impl<S, P, C> Scheduler<S, P, C>
where
    S: StateStore,
    P: ProcessInspector,
    C: Clock,
{
    pub fn with_clock(store: S, inspector: P, stale_timeout_hours: i64, clock: C) -> Self {
        Self {
            store,
            stale: StaleJobDetector::new(inspector, stale_timeout_hours),
            clock,
        }
    }

    /// The underlying state store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn find<'d>(
        name: &str,
        schedules: &'d [ScheduleDef],
    ) -> Result<&'d ScheduleDef, SchedulerError> {
        schedules
            .iter()
            .find(|def| def.name == name)
            .ok_or_else(|| SchedulerError::UnknownSchedule(name.to_string()))
    }

    /// Scan all schedules and rank the overdue ones, most overdue first.
    ///
    /// Reconciles state on the way: stale running jobs are marked failed,
    /// and failed schedules whose next slot has arrived are reset to
    /// pending. Manual schedules and schedules with a live running job are
    /// never selected.
    pub fn scan(&mut self, schedules: &[ScheduleDef]) -> Result<Vec<Overdue>, SchedulerError> {
        let now = self.clock.now();
        let mut overdue = Vec::new();

        for def in schedules {
            let Some(expr) = def.recurrence.as_deref() else {
                continue;
            };

            let mut state = self.store.load(&def.name, Some(expr), now)?;

            if self.stale.is_stale(&state, now) {
                // A stale running job counts as a failed attempt.
                state.status = RunStatus::Failed {
                    started_at: state.status.started_at(),
                    finished_at: now,
                };
                self.store.save(&state)?;
                info!(schedule = %def.name, "stale job marked failed");
            }

            if state.status.is_running() {
                debug!(schedule = %def.name, "already running, skipped");
                continue;
            }

            // Failure does not block the next scheduled slot: once that
            // instant passes, the schedule becomes eligible again.
            if matches!(state.status, RunStatus::Failed { .. })
                && let Some(next_run) = state.next_run
                && now >= next_run
            {
                state.status = RunStatus::Pending;
                self.store.save(&state)?;
            }

            if let Some(minutes) = state.overdue_minutes(now) {
                overdue.push(Overdue {
                    schedule: def.name.clone(),
                    overdue_minutes: minutes,
                });
            }
        }

        // Stable sort keeps definition order for equal urgency.
        overdue.sort_by(|a, b| b.overdue_minutes.total_cmp(&a.overdue_minutes));
        Ok(overdue)
    }

    /// Record the start of an execution attempt for `name`.
    ///
    /// Called by the job process itself; the recorded pid is this process.
    pub fn on_start(&mut self, name: &str, schedules: &[ScheduleDef]) -> Result<(), SchedulerError> {
        let def = Self::find(name, schedules)?;
        let now = self.clock.now();

        let mut state = self.store.load(&def.name, def.recurrence.as_deref(), now)?;
        state.status = RunStatus::Running {
            pid: std::process::id(),
            started_at: now,
        };
        self.store.save(&state)?;

        info!(schedule = name, pid = std::process::id(), "run started");
        Ok(())
    }

    /// Record the end of an execution attempt for `name`.
    ///
    /// On success the next run is recomputed from now; on failure
    /// `next_run` stays untouched so the already-scheduled slot becomes the
    /// retry point.
    pub fn on_finish(
        &mut self,
        name: &str,
        schedules: &[ScheduleDef],
        success: bool,
    ) -> Result<(), SchedulerError> {
        let def = Self::find(name, schedules)?;
        let now = self.clock.now();

        let mut state = self.store.load(&def.name, def.recurrence.as_deref(), now)?;
        let started_at = state.status.started_at();

        if success {
            state.status = RunStatus::Success {
                started_at,
                finished_at: now,
            };
            state.last_run = Some(now);
            if let Some(expr) = def.recurrence.as_deref() {
                state.next_run = Some(crate::recurrence::next_after(expr, now)?);
            }
        } else {
            state.status = RunStatus::Failed {
                started_at,
                finished_at: now,
            };
        }
        self.store.save(&state)?;

        info!(schedule = name, success, "run finished");
        Ok(())
    }

    /// Reinitialize a schedule's record as if freshly created, recomputing
    /// `next_run` from now when recurring.
    pub fn reset(
        &mut self,
        name: &str,
        schedules: &[ScheduleDef],
    ) -> Result<ScheduleState, SchedulerError> {
        let def = Self::find(name, schedules)?;
        let now = self.clock.now();

        let state = ScheduleState::fresh(&def.name, def.recurrence.as_deref(), now)?;
        self.store.save(&state)?;

        info!(schedule = name, "schedule reset");
        Ok(state)
    }

    /// Status report for one schedule.
    ///
    /// Never fails because of a bad persisted record — the store recovers
    /// those on load — so one corrupt schedule cannot hide the others.
    pub fn report(&mut self, def: &ScheduleDef) -> Result<ScheduleReport, SchedulerError> {
        let now = self.clock.now();
        let state = self.store.load(&def.name, def.recurrence.as_deref(), now)?;
        let overdue_minutes = state.overdue_minutes(now);

        Ok(ScheduleReport {
            name: def.name.clone(),
            recurrence: def.recurrence.clone(),
            state,
            overdue_minutes,
        })
    }
}
