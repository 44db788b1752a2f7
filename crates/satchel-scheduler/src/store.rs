//! State persistence, one record per schedule.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::warn;

use crate::error::SchedulerError;
use crate::types::ScheduleState;

/// Persistence for schedule state records.
///
/// Each schedule owns an independent record keyed by its name; records are
/// always loaded and saved whole, so a reader observes a self-consistent
/// state.
pub trait StateStore {
    /// Load the record for `name`, lazily creating and persisting a fresh
    /// pending record when none exists or the stored one is unreadable.
    ///
    /// `recurrence` seeds `next_run` for newly created records; `now` is the
    /// creation instant.
    fn load(
        &self,
        name: &str,
        recurrence: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<ScheduleState, SchedulerError>;

    /// Persist the whole record, overwriting any prior content.
    fn save(&self, state: &ScheduleState) -> Result<(), SchedulerError>;
}

/// Default on-disk location for schedule state records.
///
/// `SATCHEL_STATE_DIR` takes priority (used by tests and scripts), falling
/// back to the platform data directory.
pub fn default_state_dir() -> Result<PathBuf, SchedulerError> {
    if let Ok(dir) = std::env::var("SATCHEL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }

    dirs::data_local_dir()
        .map(|d| d.join("satchel").join("state"))
        .ok_or(SchedulerError::NoStateDir)
}

/// File-backed store: `<dir>/<schedule>.json` per schedule.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open the store at the default state directory.
    pub fn open_default() -> Result<Self, SchedulerError> {
        Ok(Self::new(default_state_dir()?))
    }

    /// Directory holding the state records (and the check lock).
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn create_fresh(
        &self,
        name: &str,
        recurrence: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<ScheduleState, SchedulerError> {
        let state = ScheduleState::fresh(name, recurrence, now)?;
        self.save(&state)?;
        Ok(state)
    }
}

impl StateStore for FileStateStore {
    fn load(
        &self,
        name: &str,
        recurrence: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<ScheduleState, SchedulerError> {
        let path = self.record_path(name);

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self.create_fresh(name, recurrence, now);
            }
            Err(e) => return Err(SchedulerError::io(path, e)),
        };

        match serde_json::from_str::<ScheduleState>(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                // Corrupt record: recover by recreating, never fail the caller.
                warn!(schedule = name, error = %e, "state record corrupted, recreating");
                self.create_fresh(name, recurrence, now)
            }
        }
    }

    fn save(&self, state: &ScheduleState) -> Result<(), SchedulerError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SchedulerError::io(&self.dir, e))?;

        let path = self.record_path(&state.schedule);
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&path, json).map_err(|e| SchedulerError::io(path, e))
    }
}

/// In-memory store for tests; records round-trip through JSON so
/// serialization behaves exactly as on disk.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the raw serialized record, e.g. to simulate corruption.
    pub fn put_raw(&self, name: &str, raw: &str) {
        self.records
            .lock()
            .unwrap()
            .insert(name.to_string(), raw.to_string());
    }
}

impl StateStore for MemoryStateStore {
    fn load(
        &self,
        name: &str,
        recurrence: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<ScheduleState, SchedulerError> {
        let raw = self.records.lock().unwrap().get(name).cloned();

        let Some(raw) = raw else {
            let state = ScheduleState::fresh(name, recurrence, now)?;
            self.save(&state)?;
            return Ok(state);
        };

        match serde_json::from_str::<ScheduleState>(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(schedule = name, error = %e, "state record corrupted, recreating");
                let state = ScheduleState::fresh(name, recurrence, now)?;
                self.save(&state)?;
                Ok(state)
            }
        }
    }

    fn save(&self, state: &ScheduleState) -> Result<(), SchedulerError> {
        let json = serde_json::to_string(state)?;
        self.records
            .lock()
            .unwrap()
            .insert(state.schedule.clone(), json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::RunStatus;

    #[test]
    fn lazy_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let now = Local::now();

        let first = store.load("daily", Some("0 3 * * *"), now).unwrap();
        let second = store.load("daily", Some("0 3 * * *"), now).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, RunStatus::Pending);
        assert!(first.next_run.is_some());
    }

    #[test]
    fn round_trip_preserves_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let now = Local::now();

        let state = ScheduleState {
            schedule: "photos".to_string(),
            last_run: Some(now - Duration::hours(20)),
            next_run: Some(now + Duration::hours(4)),
            status: RunStatus::Success {
                started_at: Some(now - Duration::hours(21)),
                finished_at: now - Duration::hours(20),
            },
        };
        store.save(&state).unwrap();

        let loaded = store.load("photos", Some("0 3 * * *"), now).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn round_trip_preserves_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let now = Local::now();

        let state = ScheduleState {
            schedule: "manual".to_string(),
            last_run: None,
            next_run: None,
            status: RunStatus::Failed {
                started_at: None,
                finished_at: now,
            },
        };
        store.save(&state).unwrap();

        let loaded = store.load("manual", None, now).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn corrupted_record_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let now = Local::now();

        std::fs::write(dir.path().join("daily.json"), "{not json").unwrap();

        let state = store.load("daily", Some("0 3 * * *"), now).unwrap();
        assert_eq!(state.status, RunStatus::Pending);
        assert!(state.next_run.is_some());

        // The fresh record was persisted in place of the corrupt one.
        let raw = std::fs::read_to_string(dir.path().join("daily.json")).unwrap();
        let reparsed: ScheduleState = serde_json::from_str(&raw).unwrap();
        assert_eq!(reparsed, state);
    }

    #[test]
    fn invalid_status_value_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());

        std::fs::write(
            dir.path().join("daily.json"),
            r#"{"schedule":"daily","last_run":null,"next_run":null,"status":"exploded"}"#,
        )
        .unwrap();

        let state = store.load("daily", None, Local::now()).unwrap();
        assert_eq!(state.status, RunStatus::Pending);
    }

    #[test]
    fn missing_required_field_is_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());

        // Running without a pid is unrepresentable; the record is replaced.
        std::fs::write(
            dir.path().join("daily.json"),
            r#"{"schedule":"daily","last_run":null,"next_run":null,"status":"running","started_at":"2026-03-01T10:00:00+00:00"}"#,
        )
        .unwrap();

        let state = store.load("daily", None, Local::now()).unwrap();
        assert_eq!(state.status, RunStatus::Pending);
    }

    #[test]
    fn records_are_stored_per_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let now = Local::now();

        store.load("a", None, now).unwrap();
        store.load("b", None, now).unwrap();

        assert!(dir.path().join("a.json").exists());
        assert!(dir.path().join("b.json").exists());
    }

    #[test]
    fn memory_store_matches_file_store_behavior() {
        let store = MemoryStateStore::new();
        let now = Local::now();

        let first = store.load("daily", Some("0 3 * * *"), now).unwrap();
        let second = store.load("daily", Some("0 3 * * *"), now).unwrap();
        assert_eq!(first, second);

        store.put_raw("daily", "garbage");
        let recovered = store.load("daily", Some("0 3 * * *"), now).unwrap();
        assert_eq!(recovered.status, RunStatus::Pending);
    }
}
