//! The `check` command: the periodic scan-and-spawn entry point.

use std::path::Path;

use miette::{IntoDiagnostic, Result};
use tracing::{debug, info};

use satchel_config::Config;
use satchel_scheduler::{CHECK_LOCK_FILE, CheckLock, FileStateStore, Scheduler, SystemInspector};

pub fn cmd_check(config: &Config, config_path: &Path) -> Result<()> {
    let store = FileStateStore::open_default().into_diagnostic()?;

    // Overlapping check invocations are expected (timer jitter); only one
    // may scan and spawn at a time.
    let lock_path = store.dir().join(CHECK_LOCK_FILE);
    let Some(_gate) = CheckLock::try_acquire(&lock_path).into_diagnostic()? else {
        debug!("another check is in progress, exiting");
        return Ok(());
    };

    let mut scheduler = Scheduler::new(
        store,
        SystemInspector::new(),
        config.general.stale_job_timeout_hours,
    );
    let overdue = scheduler.scan(&config.schedule_defs()).into_diagnostic()?;

    // Act on the single most overdue schedule; the rest wait for the next
    // cycle.
    let Some(head) = overdue.first() else {
        debug!("no overdue schedules");
        return Ok(());
    };

    info!(
        schedule = %head.schedule,
        overdue_minutes = head.overdue_minutes,
        "spawning overdue schedule"
    );
    satchel_scheduler::spawn_background_job(&head.schedule, config_path, &config.general.log_dir)
        .into_diagnostic()?;

    Ok(())
}
