//! The `status`, `list`, and `reset` commands.

use colored::Colorize;
use miette::{IntoDiagnostic, Result, miette};

use satchel_config::Config;
use satchel_scheduler::{
    FileStateStore, RunStatus, ScheduleReport, Scheduler, SystemInspector,
};

use crate::ListKind;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn scheduler(config: &Config) -> Result<Scheduler<FileStateStore, SystemInspector>> {
    Ok(Scheduler::new(
        FileStateStore::open_default().into_diagnostic()?,
        SystemInspector::new(),
        config.general.stale_job_timeout_hours,
    ))
}

pub fn cmd_status(config: &Config) -> Result<()> {
    if config.schedules.is_empty() {
        println!("No schedules configured.");
        return Ok(());
    }

    let mut scheduler = scheduler(config)?;

    // Each schedule's block is independent: a bad record is recovered by
    // the store, so one schedule can never hide the others.
    for def in config.schedule_defs() {
        let report = scheduler.report(&def).into_diagnostic()?;
        print!("{}", render_report(&report));
    }

    Ok(())
}

/// Render one schedule's status block.
fn render_report(report: &ScheduleReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("\nSchedule: {}\n", report.name));

    match &report.recurrence {
        Some(cron) => out.push_str(&format!("  Type: Scheduled (cron: {cron})\n")),
        None => out.push_str("  Type: Manual (no automatic scheduling)\n"),
    }

    let status = match &report.state.status {
        RunStatus::Success { .. } => "success".green().to_string(),
        RunStatus::Running { pid, .. } => format!("{} (PID {pid})", "running".yellow()),
        RunStatus::Failed { .. } => "failed".red().to_string(),
        RunStatus::Pending => "pending".to_string(),
    };
    out.push_str(&format!("  Status: {status}\n"));

    match &report.state.status {
        RunStatus::Running { started_at, .. } => {
            out.push_str(&format!("  Started: {}\n", started_at.format(TIME_FORMAT)));
        }
        RunStatus::Failed {
            started_at: Some(started_at),
            ..
        } if report.state.last_run.is_none() => {
            out.push_str(&format!(
                "  Last Attempt: {}\n",
                started_at.format(TIME_FORMAT)
            ));
        }
        _ => {
            if let Some(last_run) = report.state.last_run {
                out.push_str(&format!("  Last Run: {}\n", last_run.format(TIME_FORMAT)));
            }
        }
    }

    match report.state.next_run {
        Some(next_run) => {
            out.push_str(&format!("  Next Run: {}\n", next_run.format(TIME_FORMAT)));
            match report.overdue_minutes {
                Some(minutes) => out.push_str(&format!(
                    "  Overdue: {}\n",
                    format!("Yes ({} minutes)", minutes as i64).red()
                )),
                None => out.push_str("  Overdue: No\n"),
            }
        }
        None => out.push_str("  Next Run: N/A\n"),
    }

    out
}

pub fn cmd_list(config: &Config, kind: ListKind) {
    match kind {
        ListKind::Profiles => {
            println!("Profiles:");
            for (name, profile) in &config.profiles {
                println!(
                    "  {name}: {} -> {}",
                    profile.sources.join(", "),
                    profile.destination
                );
            }
        }
        ListKind::Schedules => {
            println!("Schedules:");
            for (name, schedule) in &config.schedules {
                println!("  {name}: [{}]", schedule.profiles.join(", "));
            }
        }
    }
}

pub fn cmd_reset(config: &Config, name: &str) -> Result<()> {
    if !config.schedules.contains_key(name) {
        return Err(miette!("unknown schedule: {name}"));
    }

    let mut scheduler = scheduler(config)?;
    let state = scheduler
        .reset(name, &config.schedule_defs())
        .into_diagnostic()?;

    println!("Schedule '{name}' has been reset.");
    if let Some(next_run) = state.next_run {
        println!("Next run: {}", next_run.format(TIME_FORMAT));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local};
    use pretty_assertions::assert_eq;

    use super::*;
    use satchel_scheduler::ScheduleState;

    fn report(state: ScheduleState, recurrence: Option<&str>) -> ScheduleReport {
        let overdue_minutes = state.overdue_minutes(Local::now());
        ScheduleReport {
            name: state.schedule.clone(),
            recurrence: recurrence.map(str::to_string),
            state,
            overdue_minutes,
        }
    }

    #[test]
    fn render_manual_pending() {
        colored::control::set_override(false);

        let state = ScheduleState::fresh("extras", None, Local::now()).unwrap();
        let block = render_report(&report(state, None));

        assert_eq!(
            block,
            "\nSchedule: extras\n  Type: Manual (no automatic scheduling)\n  Status: pending\n  Next Run: N/A\n"
        );
    }

    #[test]
    fn render_overdue_running_schedule() {
        colored::control::set_override(false);

        let now = Local::now();
        let mut state = ScheduleState::fresh("daily", Some("0 3 * * *"), now).unwrap();
        state.next_run = Some(now - Duration::minutes(90));
        state.status = RunStatus::Running {
            pid: 4242,
            started_at: now,
        };
        let block = render_report(&report(state, Some("0 3 * * *")));

        assert!(block.contains("Type: Scheduled (cron: 0 3 * * *)"));
        assert!(block.contains("running (PID 4242)"));
        assert!(block.contains("Started:"));
        assert!(block.contains("Overdue: Yes (90 minutes)"));
    }

    #[test]
    fn render_failed_shows_last_attempt() {
        colored::control::set_override(false);

        let now = Local::now();
        let mut state = ScheduleState::fresh("daily", Some("0 3 * * *"), now).unwrap();
        state.status = RunStatus::Failed {
            started_at: Some(now - Duration::minutes(10)),
            finished_at: now,
        };
        let block = render_report(&report(state, Some("0 3 * * *")));

        assert!(block.contains("Status: failed"));
        assert!(block.contains("Last Attempt:"));
        assert!(block.contains("Overdue: No"));
    }

    #[test]
    fn render_success_shows_last_run() {
        colored::control::set_override(false);

        let now = Local::now();
        let mut state = ScheduleState::fresh("daily", Some("0 3 * * *"), now).unwrap();
        state.last_run = Some(now - Duration::hours(3));
        state.status = RunStatus::Success {
            started_at: Some(now - Duration::hours(4)),
            finished_at: now - Duration::hours(3),
        };
        let block = render_report(&report(state, Some("0 3 * * *")));

        assert!(block.contains("Status: success"));
        assert!(block.contains("Last Run:"));
    }
}
