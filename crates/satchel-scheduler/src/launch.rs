//! Background job spawning and the check lock.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::{Command, Stdio};

use fs2::FileExt;
use tracing::info;

use crate::error::SchedulerError;

/// Name of the lock file guarding the scan-and-select phase.
pub const CHECK_LOCK_FILE: &str = "check.lock";

/// Build the command line for a background run of `schedule`.
///
/// The job re-invokes this binary so it owns its own lifecycle transitions.
pub fn job_command(schedule: &str, config_path: &Path) -> Command {
    let program = std::env::current_exe().unwrap_or_else(|_| "satchel".into());

    let mut cmd = Command::new(program);
    cmd.arg("--config").arg(config_path).arg("run").arg(schedule);
    cmd
}

/// Spawn a fully detached background execution of `schedule`.
///
/// The child gets its own process group so it survives the short-lived
/// check invocation and any signals aimed at it. Stdout and stderr append
/// to `<log_dir>/schedule-<name>.log`; each append refreshes the file's
/// mtime, which log retention relies on to spare active schedules.
pub fn spawn_background_job(
    schedule: &str,
    config_path: &Path,
    log_dir: &Path,
) -> Result<u32, SchedulerError> {
    std::fs::create_dir_all(log_dir).map_err(|e| SchedulerError::io(log_dir, e))?;

    let log_path = log_dir.join(format!("schedule-{schedule}.log"));
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| SchedulerError::io(&log_path, e))?;
    let log_err = log.try_clone().map_err(|e| SchedulerError::io(&log_path, e))?;

    let mut cmd = job_command(schedule, config_path);
    cmd.stdin(Stdio::null()).stdout(log).stderr(log_err);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn().map_err(|source| SchedulerError::Spawn {
        schedule: schedule.to_string(),
        source,
    })?;

    let pid = child.id();
    info!(schedule, pid, log = %log_path.display(), "spawned background job");
    Ok(pid)
}

/// Exclusive advisory lock around one check cycle.
///
/// Held for the scan-and-select phase only; the spawned job runs outside
/// it. The lock releases when the guard drops.
#[derive(Debug)]
pub struct CheckLock {
    // Held for the advisory lock; released on drop.
    _file: File,
}

impl CheckLock {
    /// Try to take the lock at `path` without blocking.
    ///
    /// Returns `None` when another check currently holds it — callers exit
    /// silently in that case, contention is not an error.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, SchedulerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SchedulerError::io(parent, e))?;
        }

        // Never truncate: the file may belong to a live lock holder.
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(SchedulerError::Lock)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(SchedulerError::Lock(e)),
        }
    }
}
