//! Satchel: scheduled file backup to cloud object storage.
//!
//! Subcommands:
//! - `setup`: initialize the keystore, encrypt credentials, register the
//!   periodic check trigger
//! - `run`: execute a schedule, a single profile, or everything
//! - `check`: select and spawn the most overdue schedule (periodic entry)
//! - `status`: report per-schedule state
//! - `list`: show configured profiles and schedules
//! - `reset`: reinitialize a schedule's state record

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use satchel_config::Config;

mod check;
mod logs;
mod run;
mod setup;
mod status;

#[derive(Parser)]
#[command(name = "satchel")]
#[command(version)]
#[command(about = "Backup files to cloud object storage using rclone", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(long, short = 'c', global = true, env = "SATCHEL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize keystore, encrypt credentials, register the check trigger
    Setup {
        /// Path for the encrypted secrets file
        #[arg(long)]
        secrets_file: Option<PathBuf>,

        /// Overwrite an existing secrets file
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Run a sync operation
    Run {
        /// Schedule name to run
        #[arg(conflicts_with_all = ["profile", "all"])]
        schedule: Option<String>,

        /// Run a single profile
        #[arg(long, short = 'p')]
        profile: Option<String>,

        /// Run all profiles
        #[arg(long, short = 'a', conflicts_with = "profile")]
        all: bool,

        /// Preview what would be synced without making changes
        #[arg(long, short = 'n')]
        dry_run: bool,
    },

    /// Check for overdue schedules and spawn a job if needed
    Check,

    /// Display status of all schedules
    Status,

    /// List profiles and schedules
    List {
        /// What to list
        #[arg(value_enum)]
        kind: ListKind,
    },

    /// Reset a schedule's state
    Reset {
        /// Schedule name to reset
        schedule: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ListKind {
    Profiles,
    Schedules,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(satchel_config::default_config_path);

    if let Commands::Setup { secrets_file, force } = &cli.command {
        return setup::cmd_setup(secrets_file.clone(), *force);
    }

    let config = Config::load(&config_path).into_diagnostic()?;

    // Only the commands that do real work get the full logging stack; the
    // interactive ones print directly.
    if matches!(cli.command, Commands::Run { .. } | Commands::Check) {
        logs::init(
            &config.general.log_dir,
            config.general.log_retention_days,
            cli.verbose,
        )
        .into_diagnostic()?;
    }

    match cli.command {
        Commands::Setup { .. } => unreachable!("handled above"),
        Commands::Run {
            schedule,
            profile,
            all,
            dry_run,
        } => run::cmd_run(&config, schedule, profile, all, dry_run),
        Commands::Check => check::cmd_check(&config, &config_path),
        Commands::Status => status::cmd_status(&config),
        Commands::List { kind } => {
            status::cmd_list(&config, kind);
            Ok(())
        }
        Commands::Reset { schedule } => status::cmd_reset(&config, &schedule),
    }
}
