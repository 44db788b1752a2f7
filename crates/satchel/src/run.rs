//! The `run` command: execute profiles, wrapped in lifecycle transitions
//! when a named schedule is being run.

use miette::{IntoDiagnostic, Result, miette};
use tracing::{error, info};

use satchel_config::Config;
use satchel_keystore::StorageCredentials;
use satchel_scheduler::{FileStateStore, Scheduler, SystemInspector};
use satchel_sync::SyncResult;

pub fn cmd_run(
    config: &Config,
    schedule: Option<String>,
    profile: Option<String>,
    all: bool,
    dry_run: bool,
) -> Result<()> {
    let credentials =
        satchel_keystore::credentials(&config.general.secrets_file, &config.keystore.key_alias)
            .map_err(|e| {
                error!("failed to get credentials: {e}");
                miette!("{e}\nRun 'satchel setup' to initialize credentials.")
            })?;

    // Resolve which profiles to run.
    let (profiles_to_run, schedule_name): (Vec<String>, Option<String>) = if all {
        (config.profiles.keys().cloned().collect(), None)
    } else if let Some(name) = profile {
        if !config.profiles.contains_key(&name) {
            return Err(miette!("unknown profile: {name}"));
        }
        (vec![name], None)
    } else if let Some(name) = schedule {
        let Some(sched) = config.schedules.get(&name) else {
            return Err(miette!("unknown schedule: {name}"));
        };
        (sched.profiles.clone(), Some(name))
    } else {
        return Err(miette!("nothing to run: pass a schedule, --profile, or --all"));
    };

    if profiles_to_run.is_empty() {
        return Err(miette!("no profiles to run"));
    }

    // A dry run must leave schedule state untouched.
    let track_state = schedule_name.is_some() && !dry_run;
    let defs = config.schedule_defs();
    let mut scheduler = Scheduler::new(
        FileStateStore::open_default().into_diagnostic()?,
        SystemInspector::new(),
        config.general.stale_job_timeout_hours,
    );

    if track_state
        && let Some(name) = &schedule_name
    {
        scheduler.on_start(name, &defs).into_diagnostic()?;
    }

    let outcome = sync_profiles(config, &credentials, &profiles_to_run, dry_run);
    let success = matches!(outcome, Ok(true));

    // The finish transition runs even when the attempt failed partway;
    // a record must never stay "running" without an owning process.
    if track_state
        && let Some(name) = &schedule_name
    {
        scheduler.on_finish(name, &defs, success).into_diagnostic()?;
    }

    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => Err(miette!("one or more profiles failed")),
        Err(e) => Err(e),
    }
}

fn sync_profiles(
    config: &Config,
    credentials: &StorageCredentials,
    profiles: &[String],
    dry_run: bool,
) -> Result<bool> {
    let mut results: Vec<SyncResult> = Vec::new();

    for name in profiles {
        // Membership was validated against the config above.
        let Some(profile) = config.profiles.get(name) else {
            return Err(miette!("unknown profile: {name}"));
        };
        let result = satchel_sync::sync_profile(
            name,
            profile,
            &config.general.bucket,
            credentials,
            config.general.transfers,
            dry_run,
        )
        .into_diagnostic()?;
        results.push(result);
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let total_files: usize = results.iter().map(|r| r.files_transferred).sum();
    let total_deleted: usize = results.iter().map(|r| r.deleted_files.len()).sum();

    info!(
        "sync complete: {}/{} profiles succeeded, {} files transferred, {} files deleted",
        succeeded,
        results.len(),
        total_files,
        total_deleted,
    );

    Ok(results.iter().all(|r| r.success))
}
