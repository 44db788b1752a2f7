//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or is missing required fields.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A schedule references a profile that does not exist.
    #[error("schedule '{schedule}' references unknown profile: {profile}")]
    UnknownProfile { schedule: String, profile: String },

    /// A schedule carries a cron expression that does not parse.
    #[error("schedule '{schedule}' has invalid cron expression '{expr}': {message}")]
    InvalidCron {
        schedule: String,
        expr: String,
        message: String,
    },
}
