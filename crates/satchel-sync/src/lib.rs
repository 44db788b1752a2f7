//! Transfer execution using rclone.
//!
//! Each profile source is synced to `:b2:bucket/<destination>/<dirname>`.
//! Credentials travel through environment variables so they never show up
//! in the process list, shell history, or logs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use satchel_config::Profile;
use satchel_keystore::StorageCredentials;

/// Errors during a sync operation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// rclone could not be started at all.
    #[error("failed to run rclone: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result of syncing one profile.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub profile_name: String,
    pub success: bool,
    /// Files that were (or would be) transferred.
    pub files_transferred: usize,
    /// Remote paths that were (or would be) deleted.
    pub deleted_files: Vec<String>,
    pub error: Option<String>,
    /// Dry-run summaries, grouped by top-level directory.
    pub files_by_directory: BTreeMap<String, usize>,
    pub deleted_by_directory: BTreeMap<String, usize>,
}

/// Build a B2 remote string: `:b2:bucket/path`.
fn b2_remote(bucket: &str, path: &str) -> String {
    format!(":b2:{bucket}/{path}")
}

/// Credentials via env vars, never argv.
fn rclone_env(credentials: &StorageCredentials) -> Vec<(&'static str, String)> {
    vec![
        ("RCLONE_B2_ACCOUNT", credentials.key_id.clone()),
        ("RCLONE_B2_KEY", credentials.app_key.clone()),
    ]
}

/// Build the rclone invocation for one source directory.
///
/// `track_removals` selects `sync` (mirrors deletions) over `copy`
/// (add-and-update only).
fn rclone_command(
    source: &str,
    dest: &str,
    exclude: &[String],
    transfers: u32,
    dry_run: bool,
    track_removals: bool,
) -> Command {
    let operation = if track_removals { "sync" } else { "copy" };

    let mut cmd = Command::new("rclone");
    cmd.arg(operation)
        .arg(source)
        .arg(dest)
        .arg("--transfers")
        .arg(transfers.to_string())
        .arg("--checksum")
        .arg("-v");

    for pattern in exclude {
        cmd.arg("--exclude").arg(pattern);
    }

    if dry_run {
        cmd.arg("--dry-run");
    } else {
        // Progress bar for live transfers.
        cmd.arg("--progress");
    }

    cmd
}

/// Sync one profile to the bucket.
///
/// In dry-run mode rclone's output is captured and parsed into a summary;
/// live runs stream output through to the caller's terminal (and thereby
/// into the per-schedule log for background jobs).
pub fn sync_profile(
    profile_name: &str,
    profile: &Profile,
    bucket: &str,
    credentials: &StorageCredentials,
    transfers: u32,
    dry_run: bool,
) -> Result<SyncResult, SyncError> {
    info!(profile = profile_name, dry_run, "syncing profile");

    let mut all_transfers: Vec<String> = Vec::new();
    let mut all_deletes: Vec<String> = Vec::new();

    for source in &profile.sources {
        let source_path = Path::new(source);
        if !source_path.exists() {
            warn!(source, "source path does not exist, skipping");
            continue;
        }

        // /storage/emulated/0/DCIM -> bucket/photos/DCIM
        let dir_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = b2_remote(bucket, &format!("{}/{}", profile.destination, dir_name));

        let mut cmd = rclone_command(
            source,
            &dest,
            &profile.exclude,
            transfers,
            dry_run,
            profile.track_removals,
        );
        for (key, value) in rclone_env(credentials) {
            cmd.env(key, value);
        }

        debug!(?cmd, "running rclone");

        if dry_run {
            // Capture output for the dry-run summary.
            let output = cmd.output()?;
            let stderr = String::from_utf8_lossy(&output.stderr);

            if !output.status.success() {
                return Ok(failed_result(profile_name, source, &stderr));
            }

            let (transfers_list, deletes_list) = parse_dry_run_output(&stderr);
            all_transfers.extend(transfers_list);
            all_deletes.extend(deletes_list);
        } else {
            // Let stderr through for live progress.
            let status = cmd.status()?;
            if !status.success() {
                return Ok(failed_result(
                    profile_name,
                    source,
                    &format!("rclone exited with {status}"),
                ));
            }
        }
    }

    let files_by_directory = group_by_directory(&all_transfers);
    let deleted_by_directory = group_by_directory(&all_deletes);

    if dry_run {
        log_dry_run_summary(profile_name, &files_by_directory, &deleted_by_directory);
    } else {
        info!(profile = profile_name, "profile complete");
    }

    Ok(SyncResult {
        profile_name: profile_name.to_string(),
        success: true,
        files_transferred: all_transfers.len(),
        deleted_files: all_deletes,
        error: None,
        files_by_directory,
        deleted_by_directory,
    })
}

fn failed_result(profile_name: &str, source: &str, error_msg: &str) -> SyncResult {
    error!(profile = profile_name, source, error = error_msg, "sync failed");
    SyncResult {
        profile_name: profile_name.to_string(),
        success: false,
        error: Some(error_msg.to_string()),
        ..SyncResult::default()
    }
}

fn transfer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"NOTICE: (.+): Skipped (?:copy|update)").unwrap())
}

fn delete_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"NOTICE: (.+): Skipped delete").unwrap())
}

/// Extract file paths from rclone dry-run output.
///
/// rclone reports planned work as lines like
/// `NOTICE: path/to/file.jpg: Skipped copy as --dry-run is set`.
fn parse_dry_run_output(output: &str) -> (Vec<String>, Vec<String>) {
    let mut transfers = Vec::new();
    let mut deletes = Vec::new();

    for line in output.lines() {
        if let Some(captures) = transfer_re().captures(line) {
            transfers.push(captures[1].to_string());
        } else if let Some(captures) = delete_re().captures(line) {
            deletes.push(captures[1].to_string());
        }
    }

    (transfers, deletes)
}

/// Count files per top-level directory.
fn group_by_directory(files: &[String]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();

    for file in files {
        let path = PathBuf::from(file);
        let key = match path.components().next() {
            Some(first) if path.components().count() > 1 => {
                first.as_os_str().to_string_lossy().into_owned()
            }
            _ => ".".to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }

    counts
}

fn log_dry_run_summary(
    profile_name: &str,
    files_by_dir: &BTreeMap<String, usize>,
    deleted_by_dir: &BTreeMap<String, usize>,
) {
    let total_files: usize = files_by_dir.values().sum();
    let total_deleted: usize = deleted_by_dir.values().sum();

    info!(profile = profile_name, "dry-run summary");
    if total_files > 0 {
        info!("files to transfer: {total_files}");
        for (dir, count) in files_by_dir {
            info!("  {dir}: {count} files");
        }
    } else {
        info!("files to transfer: 0 (already synced)");
    }

    if total_deleted > 0 {
        info!("files to delete: {total_deleted}");
        for (dir, count) in deleted_by_dir {
            info!("  {dir}: {count} files");
        }
    }
}
