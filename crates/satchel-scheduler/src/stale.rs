//! Stale job detection.
//!
//! A persisted "running" record is only trustworthy while the process it
//! names is the process that wrote it. This module decides whether such a
//! record has gone stale: the process died, its pid was recycled by an
//! unrelated process, or the job has been running far past its timeout.

use chrono::{DateTime, Local};
use tracing::warn;

use crate::process::ProcessInspector;
use crate::types::{RunStatus, ScheduleState};

/// Tolerated divergence between the recorded start time and the actual
/// process start time, covering clock precision and process startup jitter.
const START_TIME_TOLERANCE_SECS: i64 = 60;

/// Detects stale running jobs via a [`ProcessInspector`].
#[derive(Debug)]
pub struct StaleJobDetector<P> {
    inspector: P,
    timeout_hours: i64,
}

impl<P: ProcessInspector> StaleJobDetector<P> {
    /// `timeout_hours` is the maximum wall-clock runtime before a job is
    /// declared hung.
    pub fn new(inspector: P, timeout_hours: i64) -> Self {
        Self {
            inspector,
            timeout_hours,
        }
    }

    /// Whether this record describes a job that is no longer really running.
    ///
    /// Only meaningful for running records; anything else reports false.
    /// As a side effect, a job past its timeout is sent a graceful
    /// termination signal (failure to deliver is swallowed — the slot is
    /// reclaimed either way).
    pub fn is_stale(&mut self, state: &ScheduleState, now: DateTime<Local>) -> bool {
        let RunStatus::Running { pid, started_at } = state.status else {
            return false;
        };

        if !self.inspector.exists(pid) {
            warn!(schedule = %state.schedule, pid, "job process no longer exists");
            return true;
        }

        // A recycled pid means the original job died; without this check a
        // timeout would terminate an innocent process that happens to reuse
        // the freed id. An uninspectable process is treated the same way.
        match self.inspector.start_time(pid) {
            Some(actual_start) => {
                let diff = (actual_start - started_at).num_seconds().abs();
                if diff > START_TIME_TOLERANCE_SECS {
                    warn!(
                        schedule = %state.schedule,
                        pid,
                        diff_secs = diff,
                        "process start time mismatch, pid reused by another process"
                    );
                    return true;
                }
            }
            None => {
                warn!(schedule = %state.schedule, pid, "job process no longer inspectable");
                return true;
            }
        }

        let runtime_hours = (now - started_at).num_seconds() as f64 / 3600.0;
        if runtime_hours > self.timeout_hours as f64 {
            warn!(
                schedule = %state.schedule,
                pid,
                runtime_hours,
                timeout_hours = self.timeout_hours,
                "job exceeded timeout, requesting termination"
            );
            self.inspector.terminate(pid);
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use chrono::Duration;

    use super::*;

    /// Scripted process table for tests.
    #[derive(Debug, Default)]
    struct FakeInspector {
        alive: HashSet<u32>,
        start_times: HashMap<u32, DateTime<Local>>,
        terminated: Vec<u32>,
    }

    impl FakeInspector {
        fn with_process(pid: u32, started: DateTime<Local>) -> Self {
            let mut fake = Self::default();
            fake.alive.insert(pid);
            fake.start_times.insert(pid, started);
            fake
        }
    }

    impl ProcessInspector for FakeInspector {
        fn exists(&mut self, pid: u32) -> bool {
            self.alive.contains(&pid)
        }

        fn start_time(&mut self, pid: u32) -> Option<DateTime<Local>> {
            self.start_times.get(&pid).copied()
        }

        fn terminate(&mut self, pid: u32) {
            self.terminated.push(pid);
        }
    }

    fn running(pid: u32, started_at: DateTime<Local>) -> ScheduleState {
        ScheduleState {
            schedule: "job".to_string(),
            last_run: None,
            next_run: None,
            status: RunStatus::Running { pid, started_at },
        }
    }

    #[test]
    fn non_running_states_are_never_stale() {
        let now = Local::now();
        let mut detector = StaleJobDetector::new(FakeInspector::default(), 24);

        let pending = ScheduleState::fresh("job", None, now).unwrap();
        assert!(!detector.is_stale(&pending, now));

        let failed = ScheduleState {
            status: RunStatus::Failed {
                started_at: Some(now),
                finished_at: now,
            },
            ..pending.clone()
        };
        assert!(!detector.is_stale(&failed, now));
    }

    #[test]
    fn dead_pid_is_stale() {
        let now = Local::now();
        let mut detector = StaleJobDetector::new(FakeInspector::default(), 24);

        let state = running(12345, now - Duration::minutes(5));
        assert!(detector.is_stale(&state, now));
    }

    #[test]
    fn recycled_pid_is_stale_and_not_terminated() {
        let now = Local::now();
        let recorded_start = now - Duration::hours(30);
        // The live process started long after the recorded job did: the pid
        // was recycled.
        let mut detector =
            StaleJobDetector::new(FakeInspector::with_process(777, now - Duration::minutes(2)), 24);

        let state = running(777, recorded_start);
        assert!(detector.is_stale(&state, now));
        // The innocent process must not receive a termination signal even
        // though the recorded runtime exceeds the timeout.
        assert!(detector.inspector.terminated.is_empty());
    }

    #[test]
    fn start_time_within_tolerance_is_not_stale() {
        let now = Local::now();
        let started = now - Duration::minutes(30);
        // 45 seconds of divergence is within the tolerance window.
        let mut detector = StaleJobDetector::new(
            FakeInspector::with_process(888, started + Duration::seconds(45)),
            24,
        );

        let state = running(888, started);
        assert!(!detector.is_stale(&state, now));
    }

    #[test]
    fn uninspectable_process_is_stale() {
        let now = Local::now();
        let started = now - Duration::minutes(30);
        let mut fake = FakeInspector::default();
        fake.alive.insert(999);
        // Alive but no readable start time (permission denied, vanished).
        let mut detector = StaleJobDetector::new(fake, 24);

        let state = running(999, started);
        assert!(detector.is_stale(&state, now));
    }

    #[test]
    fn hung_job_is_stale_and_terminated() {
        let now = Local::now();
        let started = now - Duration::hours(30);
        let mut detector = StaleJobDetector::new(FakeInspector::with_process(555, started), 24);

        let state = running(555, started);
        assert!(detector.is_stale(&state, now));
        assert_eq!(detector.inspector.terminated, vec![555]);
    }

    #[test]
    fn healthy_job_within_timeout_is_not_stale() {
        let now = Local::now();
        let started = now - Duration::hours(2);
        let mut detector = StaleJobDetector::new(FakeInspector::with_process(321, started), 24);

        let state = running(321, started);
        assert!(!detector.is_stale(&state, now));
        assert!(detector.inspector.terminated.is_empty());
    }
}
