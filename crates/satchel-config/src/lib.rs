//! Configuration loading and validation.
//!
//! Satchel is configured by a single TOML file: general settings, the
//! keystore key alias, named sync profiles, and named schedules grouping
//! those profiles. Cron expressions are validated here, at load time, so
//! the scheduler core can assume syntactically valid recurrence rules.

mod error;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use satchel_scheduler::ScheduleDef;

pub use error::ConfigError;

/// Default parallel transfer count passed to the transfer tool.
const DEFAULT_TRANSFERS: u32 = 4;

/// Default number of days to keep log files.
const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

/// Default maximum runtime before a background job counts as hung.
const DEFAULT_STALE_JOB_TIMEOUT_HOURS: i64 = 24;

/// Default key alias in the device keystore.
pub const DEFAULT_KEY_ALIAS: &str = "satchel";

/// Default config file location: `<config dir>/satchel/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("satchel")
        .join("config.toml")
}

/// Default encrypted secrets file location: `<config dir>/satchel/secrets.gpg`.
pub fn default_secrets_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("satchel")
        .join("secrets.gpg")
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logs")
}

/// Main configuration container.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub general: General,
    #[serde(default)]
    pub keystore: Keystore,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default)]
    pub schedules: BTreeMap<String, Schedule>,
}

/// `[general]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct General {
    /// Destination bucket in the object store.
    pub bucket: String,
    /// Directory for invocation and per-schedule job logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Days to keep log files; 0 disables cleanup.
    #[serde(default = "General::default_log_retention_days")]
    pub log_retention_days: u32,
    /// Parallel transfers per sync invocation.
    #[serde(default = "General::default_transfers")]
    pub transfers: u32,
    /// Hours before a running job is considered hung.
    #[serde(default = "General::default_stale_job_timeout_hours")]
    pub stale_job_timeout_hours: i64,
    /// Encrypted secrets file.
    #[serde(default = "default_secrets_path")]
    pub secrets_file: PathBuf,
}

impl General {
    fn default_transfers() -> u32 {
        DEFAULT_TRANSFERS
    }

    fn default_log_retention_days() -> u32 {
        DEFAULT_LOG_RETENTION_DAYS
    }

    fn default_stale_job_timeout_hours() -> i64 {
        DEFAULT_STALE_JOB_TIMEOUT_HOURS
    }
}

/// `[keystore]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Keystore {
    /// Alias of the signing key in the device keystore.
    #[serde(default = "Keystore::default_key_alias")]
    pub key_alias: String,
}

impl Keystore {
    fn default_key_alias() -> String {
        DEFAULT_KEY_ALIAS.to_string()
    }
}

impl Default for Keystore {
    fn default() -> Self {
        Self {
            key_alias: Self::default_key_alias(),
        }
    }
}

/// A sync profile: sources and a destination prefix.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Local directories to back up.
    pub sources: Vec<String>,
    /// Destination prefix inside the bucket.
    pub destination: String,
    /// Exclude patterns passed through to the transfer tool.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Mirror deletions to the remote (`sync`) instead of add-only (`copy`).
    #[serde(default = "Profile::default_track_removals")]
    pub track_removals: bool,
}

impl Profile {
    fn default_track_removals() -> bool {
        true
    }
}

/// A schedule grouping profiles, with an optional recurrence rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schedule {
    /// Profiles run by this schedule, in order.
    pub profiles: Vec<String>,
    /// Cron expression (5 fields, local time); absent means manual-only.
    #[serde(default)]
    pub cron: Option<String>,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, schedule) in &self.schedules {
            for profile in &schedule.profiles {
                if !self.profiles.contains_key(profile) {
                    return Err(ConfigError::UnknownProfile {
                        schedule: name.clone(),
                        profile: profile.clone(),
                    });
                }
            }

            if let Some(expr) = &schedule.cron {
                // Validate with the same parser the scheduler uses.
                satchel_scheduler::next_after(expr, chrono::Local::now()).map_err(|source| {
                    ConfigError::InvalidCron {
                        schedule: name.clone(),
                        expr: expr.clone(),
                        message: source.to_string(),
                    }
                })?;
            }
        }
        Ok(())
    }

    /// Schedule definitions for the scheduler core, in name order.
    pub fn schedule_defs(&self) -> Vec<ScheduleDef> {
        self.schedules
            .iter()
            .map(|(name, schedule)| ScheduleDef::new(name.clone(), schedule.cron.clone()))
            .collect()
    }
}
