//! Process table introspection behind a small capability trait.

use chrono::{DateTime, Local, TimeZone};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System};

/// What the stale job detector needs to know about host processes.
///
/// Keeping this behind a trait makes the detection algorithm
/// platform-agnostic and unit-testable with a fake implementation.
pub trait ProcessInspector {
    /// Whether a process with this id currently exists.
    fn exists(&mut self, pid: u32) -> bool;

    /// Actual start time of the process, when it can be inspected.
    fn start_time(&mut self, pid: u32) -> Option<DateTime<Local>>;

    /// Request graceful termination. Failures are ignored by callers; the
    /// process being gone already achieves the goal.
    fn terminate(&mut self, pid: u32);
}

/// Inspector backed by the OS process table.
#[derive(Debug, Default)]
pub struct SystemInspector {
    system: System,
}

impl SystemInspector {
    pub fn new() -> Self {
        Self::default()
    }

    fn refresh(&mut self, pid: u32) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
            true,
            ProcessRefreshKind::new(),
        );
    }
}

impl ProcessInspector for SystemInspector {
    fn exists(&mut self, pid: u32) -> bool {
        self.refresh(pid);
        self.system.process(Pid::from_u32(pid)).is_some()
    }

    fn start_time(&mut self, pid: u32) -> Option<DateTime<Local>> {
        self.refresh(pid);
        let process = self.system.process(Pid::from_u32(pid))?;
        Local.timestamp_opt(process.start_time() as i64, 0).single()
    }

    fn terminate(&mut self, pid: u32) {
        self.refresh(pid);
        if let Some(process) = self.system.process(Pid::from_u32(pid)) {
            process.kill_with(Signal::Term);
        }
    }
}
