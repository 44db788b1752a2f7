//! Logging setup with dual output and mtime-based retention.
//!
//! Every `run`/`check` invocation writes a timestamped
//! `satchel-YYYYMMDD-HHMMSS.log`; background jobs append to their
//! `schedule-<name>.log`. Old files of both kinds are removed by mtime, so
//! a schedule that is still appending keeps its log alive.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Local;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing with stdout and file output.
///
/// Cleans up expired logs first, then creates this invocation's log file.
/// Returns the log file path.
pub fn init(log_dir: &Path, retention_days: u32, verbose: bool) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    cleanup_old_logs(log_dir, retention_days)?;

    let log_path = log_dir.join(format!("satchel-{}.log", Local::now().format("%Y%m%d-%H%M%S")));
    let log_file = File::create(&log_path)?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();

    tracing::info!(log = %log_path.display(), "logging initialized");
    Ok(log_path)
}

/// Remove log files older than `retention_days` by modification time.
///
/// Covers both invocation logs (`satchel-*.log`) and background job logs
/// (`schedule-*.log`). Retention 0 disables cleanup. Returns the number of
/// files removed.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> std::io::Result<usize> {
    if retention_days == 0 {
        return Ok(0);
    }

    let cutoff = SystemTime::now() - Duration::from_secs(u64::from(retention_days) * 24 * 3600);
    let mut removed = 0;

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        let is_log = (name.starts_with("satchel-") || name.starts_with("schedule-"))
            && name.ends_with(".log");
        if !is_log {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified < cutoff {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age_file(path: &Path, days: u64) {
        // Backdate the mtime well past the retention cutoff.
        let old = SystemTime::now() - Duration::from_secs(days * 24 * 3600);
        let file = File::options().write(true).open(path).unwrap();
        file.set_times(std::fs::FileTimes::new().set_modified(old))
            .unwrap();
    }

    #[test]
    fn cleanup_removes_only_expired_logs() {
        let dir = tempfile::tempdir().unwrap();
        let expired = dir.path().join("satchel-20260101-000000.log");
        let expired_job = dir.path().join("schedule-daily.log");
        let fresh = dir.path().join("satchel-20260801-000000.log");
        let unrelated = dir.path().join("notes.txt");

        for path in [&expired, &expired_job, &fresh, &unrelated] {
            std::fs::write(path, "x").unwrap();
        }
        age_file(&expired, 30);
        age_file(&expired_job, 30);
        age_file(&unrelated, 30);

        let removed = cleanup_old_logs(dir.path(), 7).unwrap();

        assert_eq!(removed, 2);
        assert!(!expired.exists());
        assert!(!expired_job.exists());
        assert!(fresh.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn zero_retention_disables_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("satchel-20200101-000000.log");
        std::fs::write(&old, "x").unwrap();
        age_file(&old, 2000);

        assert_eq!(cleanup_old_logs(dir.path(), 0).unwrap(), 0);
        assert!(old.exists());
    }

    #[test]
    fn active_schedule_log_survives() {
        let dir = tempfile::tempdir().unwrap();
        let active = dir.path().join("schedule-daily.log");
        // Freshly appended: mtime is now.
        std::fs::write(&active, "recent output").unwrap();

        cleanup_old_logs(dir.path(), 7).unwrap();
        assert!(active.exists());
    }
}
