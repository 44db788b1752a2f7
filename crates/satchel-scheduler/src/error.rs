//! Error types for the scheduler core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A lifecycle call named a schedule that is not configured.
    #[error("unknown schedule: {0}")]
    UnknownSchedule(String),

    /// A cron expression failed to parse.
    #[error("invalid cron expression '{expr}': {source}")]
    Recurrence {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    /// Reading or writing a state record failed.
    #[error("state store I/O at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing a state record failed.
    #[error("state serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No usable state directory could be determined.
    #[error("could not determine state directory")]
    NoStateDir,

    /// Spawning a detached background job failed.
    #[error("failed to spawn background job for '{schedule}': {source}")]
    Spawn {
        schedule: String,
        #[source]
        source: std::io::Error,
    },

    /// Opening or locking the check lock file failed (not contention).
    #[error("check lock error: {0}")]
    Lock(#[source] std::io::Error),
}

impl SchedulerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
