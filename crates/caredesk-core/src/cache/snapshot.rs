//! On-disk form of the store.
//!
//! Only cached values and their timestamps are written. Loading flags and
//! error messages belong to the running process and always start empty.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::entry::CacheEntry;
use super::resource::{Namespace, ResourceKind};
use super::store::StoreState;

/// Fixed name of the snapshot inside the cache directory.
pub const STORE_FILE: &str = "data-store.json";

/// Five value maps and five timestamp maps (Unix milliseconds), all keyed by
/// team id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub team_data: HashMap<String, Value>,
    #[serde(default)]
    pub team_data_timestamp: HashMap<String, i64>,
    #[serde(default)]
    pub tasks: HashMap<String, Value>,
    #[serde(default)]
    pub tasks_timestamp: HashMap<String, i64>,
    #[serde(default)]
    pub routines: HashMap<String, Value>,
    #[serde(default)]
    pub routines_timestamp: HashMap<String, i64>,
    #[serde(default)]
    pub notes: HashMap<String, Value>,
    #[serde(default)]
    pub notes_timestamp: HashMap<String, i64>,
    #[serde(default)]
    pub moods: HashMap<String, Value>,
    #[serde(default)]
    pub moods_timestamp: HashMap<String, i64>,
}

type Dumped = (HashMap<String, Value>, HashMap<String, i64>);

fn dump<V: Serialize>(namespace: &Namespace<V>) -> Result<Dumped, serde_json::Error> {
    let mut values = HashMap::with_capacity(namespace.len());
    let mut stamps = HashMap::with_capacity(namespace.len());
    for (team_id, entry) in namespace.iter() {
        values.insert(team_id.clone(), serde_json::to_value(&entry.value)?);
        stamps.insert(team_id.clone(), entry.fetched_at.timestamp_millis());
    }
    Ok((values, stamps))
}

/// Values that no longer match the expected shape (a collection stored as
/// something other than a list, a null team) are dropped as if absent.
fn load<V: DeserializeOwned>(
    kind: ResourceKind,
    values: HashMap<String, Value>,
    stamps: &HashMap<String, i64>,
) -> Namespace<V> {
    let mut namespace = Namespace::default();
    for (team_id, raw) in values {
        match serde_json::from_value::<V>(raw) {
            Ok(value) => {
                let fetched_at = stamps
                    .get(&team_id)
                    .and_then(|ms| DateTime::from_timestamp_millis(*ms))
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                namespace.insert(&team_id, CacheEntry { value, fetched_at });
            }
            Err(e) => {
                debug!(
                    resource = %kind,
                    team_id = %team_id,
                    error = %e,
                    "Dropping unreadable cached value"
                );
            }
        }
    }
    namespace
}

impl Snapshot {
    pub fn capture(state: &StoreState) -> Result<Self, serde_json::Error> {
        let (team_data, team_data_timestamp) = dump(&state.team_data)?;
        let (tasks, tasks_timestamp) = dump(&state.tasks)?;
        let (routines, routines_timestamp) = dump(&state.routines)?;
        let (notes, notes_timestamp) = dump(&state.notes)?;
        let (moods, moods_timestamp) = dump(&state.moods)?;

        Ok(Self {
            team_data,
            team_data_timestamp,
            tasks,
            tasks_timestamp,
            routines,
            routines_timestamp,
            notes,
            notes_timestamp,
            moods,
            moods_timestamp,
        })
    }

    /// Rebuild the store state. Loading and error maps start empty.
    pub fn into_state(self) -> StoreState {
        StoreState {
            team_data: load(ResourceKind::TeamData, self.team_data, &self.team_data_timestamp),
            tasks: load(ResourceKind::Tasks, self.tasks, &self.tasks_timestamp),
            routines: load(ResourceKind::Routines, self.routines, &self.routines_timestamp),
            notes: load(ResourceKind::Notes, self.notes, &self.notes_timestamp),
            moods: load(ResourceKind::Moods, self.moods, &self.moods_timestamp),
            ..StoreState::default()
        }
    }
}

/// The durable home of the snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(cache_dir: &Path) -> Self {
        Self::new(cache_dir.join(STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store snapshot: {}", self.path.display()))?;

        let snapshot: Snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse store snapshot: {}", self.path.display()))?;

        Ok(Some(snapshot))
    }

    /// Write through a temporary file so a crash never leaves half a snapshot.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write store snapshot: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace store snapshot: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;
    use serde_json::json;

    #[test]
    fn test_non_list_collection_is_dropped() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "tasks": {
                "good": [{"id": "t1", "name": "Walk", "status": "TODO"}],
                "bad": {"placeholder": true}
            },
            "tasksTimestamp": {"good": 1_700_000_000_000i64}
        }))
        .unwrap();

        let state = snapshot.into_state();
        let good: &CacheEntry<Vec<Task>> = state.tasks.get("good").unwrap();
        assert_eq!(good.value[0].id, "t1");
        assert_eq!(good.fetched_at.timestamp_millis(), 1_700_000_000_000);
        assert!(state.tasks.get("bad").is_none());
    }

    #[test]
    fn test_missing_timestamp_means_stale() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "moods": {"team1": []}
        }))
        .unwrap();

        let state = snapshot.into_state();
        assert!(state.moods.get("team1").unwrap().is_invalidated());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::in_dir(&dir.path().join("nested"));
        assert!(file.load().unwrap().is_none());

        let mut snapshot = Snapshot::default();
        snapshot.notes.insert("team1".to_string(), json!([]));
        snapshot.notes_timestamp.insert("team1".to_string(), 42);
        file.save(&snapshot).unwrap();

        assert_eq!(file.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::in_dir(dir.path());
        std::fs::write(file.path(), "{ truncated").unwrap();
        assert!(file.load().is_err());
    }
}
