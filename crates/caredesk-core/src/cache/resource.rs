//! Resource kinds and the per-kind configuration the fetch engine runs on.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::warn;

use super::entry::CacheEntry;
use super::store::StoreState;
use crate::api::ApiError;
use crate::models::{Mood, Note, Routine, Task, TeamData};

/// Timeout for the team data and notes requests.
/// The other resources rely on the transport default.
const SLOW_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    TeamData,
    Tasks,
    Routines,
    Notes,
    Moods,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::TeamData,
        ResourceKind::Tasks,
        ResourceKind::Routines,
        ResourceKind::Notes,
        ResourceKind::Moods,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::TeamData => "teamData",
            ResourceKind::Tasks => "tasks",
            ResourceKind::Routines => "routines",
            ResourceKind::Notes => "notes",
            ResourceKind::Moods => "moods",
        }
    }

    /// Path segment under `/teams/{team_id}/`.
    fn segment(&self) -> &'static str {
        match self {
            ResourceKind::TeamData => "members",
            other => other.name(),
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            ResourceKind::TeamData => Duration::minutes(5),
            ResourceKind::Tasks | ResourceKind::Routines | ResourceKind::Notes => {
                Duration::minutes(2)
            }
            ResourceKind::Moods => Duration::minutes(1),
        }
    }

    pub fn timeout(&self) -> Option<StdDuration> {
        match self {
            ResourceKind::TeamData | ResourceKind::Notes => {
                Some(StdDuration::from_secs(SLOW_REQUEST_TIMEOUT_SECS))
            }
            _ => None,
        }
    }

    pub fn collection_path(&self, team_id: &str) -> String {
        format!("/teams/{}/{}", team_id, self.segment())
    }

    pub fn item_path(&self, team_id: &str, id: &str) -> String {
        format!("/teams/{}/{}/{}", team_id, self.segment(), id)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "team" | "teamdata" | "members" => Ok(ResourceKind::TeamData),
            "tasks" => Ok(ResourceKind::Tasks),
            "routines" => Ok(ResourceKind::Routines),
            "notes" => Ok(ResourceKind::Notes),
            "moods" => Ok(ResourceKind::Moods),
            other => Err(format!("unknown resource: {}", other)),
        }
    }
}

/// Key of the loading and error maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusKey {
    pub kind: ResourceKind,
    pub team_id: String,
}

impl StatusKey {
    pub fn new(kind: ResourceKind, team_id: &str) -> Self {
        Self {
            kind,
            team_id: team_id.to_string(),
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.team_id)
    }
}

/// Cached values of one resource kind, keyed by team id.
#[derive(Debug, Clone)]
pub struct Namespace<V> {
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V> Default for Namespace<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> Namespace<V> {
    pub fn get(&self, team_id: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(team_id)
    }

    pub fn get_mut(&mut self, team_id: &str) -> Option<&mut CacheEntry<V>> {
        self.entries.get_mut(team_id)
    }

    pub fn insert(&mut self, team_id: &str, entry: CacheEntry<V>) {
        self.entries.insert(team_id.to_string(), entry);
    }

    /// Returns whether there was an entry to invalidate.
    pub fn invalidate(&mut self, team_id: &str) -> bool {
        match self.entries.get_mut(team_id) {
            Some(entry) => {
                entry.invalidate();
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry<V>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One cached resource: where it lives in the store and how to unwrap the
/// server's response into the cached value.
pub trait Resource: Send + Sync + 'static {
    type Value: Clone + Serialize + DeserializeOwned + Send + 'static;

    const KIND: ResourceKind;

    fn namespace(state: &StoreState) -> &Namespace<Self::Value>;

    fn namespace_mut(state: &mut StoreState) -> &mut Namespace<Self::Value>;

    fn extract(body: Value) -> Result<Self::Value, ApiError>;
}

fn invalid(kind: ResourceKind, err: serde_json::Error) -> ApiError {
    ApiError::InvalidResponse(format!("Unexpected {} payload: {}", kind, err))
}

/// Parse a list item by item. Items that cannot be read at all (no usable
/// id, not an object) are skipped; anything other than an array is empty.
fn items<T: DeserializeOwned>(kind: ResourceKind, list: Value) -> Vec<T> {
    let Value::Array(raw) = list else {
        return Vec::new();
    };

    raw.into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(resource = %kind, index, error = %e, "Skipping unreadable item");
                None
            }
        })
        .collect()
}

/// Unwrap `{ "<field>": [...] }`. A missing field, a null field, or a body
/// that is not an object yields an empty list.
fn list_field<T: DeserializeOwned>(kind: ResourceKind, body: Value, field: &str) -> Vec<T> {
    match body {
        Value::Object(mut map) => map
            .remove(field)
            .map(|list| items(kind, list))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub struct TeamDataResource;
pub struct TasksResource;
pub struct RoutinesResource;
pub struct NotesResource;
pub struct MoodsResource;

impl Resource for TeamDataResource {
    type Value = TeamData;
    const KIND: ResourceKind = ResourceKind::TeamData;

    fn namespace(state: &StoreState) -> &Namespace<TeamData> {
        &state.team_data
    }

    fn namespace_mut(state: &mut StoreState) -> &mut Namespace<TeamData> {
        &mut state.team_data
    }

    fn extract(body: Value) -> Result<TeamData, ApiError> {
        serde_json::from_value(body).map_err(|e| invalid(Self::KIND, e))
    }
}

impl Resource for TasksResource {
    type Value = Vec<Task>;
    const KIND: ResourceKind = ResourceKind::Tasks;

    fn namespace(state: &StoreState) -> &Namespace<Vec<Task>> {
        &state.tasks
    }

    fn namespace_mut(state: &mut StoreState) -> &mut Namespace<Vec<Task>> {
        &mut state.tasks
    }

    fn extract(body: Value) -> Result<Vec<Task>, ApiError> {
        Ok(list_field(Self::KIND, body, "tasks"))
    }
}

impl Resource for RoutinesResource {
    type Value = Vec<Routine>;
    const KIND: ResourceKind = ResourceKind::Routines;

    fn namespace(state: &StoreState) -> &Namespace<Vec<Routine>> {
        &state.routines
    }

    fn namespace_mut(state: &mut StoreState) -> &mut Namespace<Vec<Routine>> {
        &mut state.routines
    }

    /// `recurrenceDaysOfWeek` is normalized to a list while deserializing.
    fn extract(body: Value) -> Result<Vec<Routine>, ApiError> {
        Ok(list_field(Self::KIND, body, "routines"))
    }
}

impl Resource for NotesResource {
    type Value = Vec<Note>;
    const KIND: ResourceKind = ResourceKind::Notes;

    fn namespace(state: &StoreState) -> &Namespace<Vec<Note>> {
        &state.notes
    }

    fn namespace_mut(state: &mut StoreState) -> &mut Namespace<Vec<Note>> {
        &mut state.notes
    }

    fn extract(body: Value) -> Result<Vec<Note>, ApiError> {
        Ok(list_field(Self::KIND, body, "notes"))
    }
}

impl Resource for MoodsResource {
    type Value = Vec<Mood>;
    const KIND: ResourceKind = ResourceKind::Moods;

    fn namespace(state: &StoreState) -> &Namespace<Vec<Mood>> {
        &state.moods
    }

    fn namespace_mut(state: &mut StoreState) -> &mut Namespace<Vec<Mood>> {
        &mut state.moods
    }

    /// Moods come back as a bare array.
    fn extract(body: Value) -> Result<Vec<Mood>, ApiError> {
        Ok(items(Self::KIND, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paths() {
        assert_eq!(ResourceKind::TeamData.collection_path("t1"), "/teams/t1/members");
        assert_eq!(ResourceKind::Tasks.item_path("t1", "x"), "/teams/t1/tasks/x");
    }

    #[test]
    fn test_ttls_and_timeouts() {
        assert_eq!(ResourceKind::TeamData.ttl(), Duration::minutes(5));
        assert_eq!(ResourceKind::Notes.ttl(), Duration::minutes(2));
        assert_eq!(ResourceKind::Moods.ttl(), Duration::minutes(1));
        assert_eq!(ResourceKind::Notes.timeout(), Some(StdDuration::from_secs(15)));
        assert_eq!(ResourceKind::TeamData.timeout(), Some(StdDuration::from_secs(15)));
        assert_eq!(ResourceKind::Tasks.timeout(), None);
    }

    #[test]
    fn test_status_key_display() {
        assert_eq!(StatusKey::new(ResourceKind::Tasks, "team1").to_string(), "tasks-team1");
    }

    #[test]
    fn test_missing_list_field_defaults_to_empty() {
        assert!(TasksResource::extract(json!({})).unwrap().is_empty());
        assert!(NotesResource::extract(json!({"notes": null})).unwrap().is_empty());
        assert!(RoutinesResource::extract(json!([1, 2])).unwrap().is_empty());
        assert!(MoodsResource::extract(json!({"moods": []})).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_items_are_skipped() {
        let tasks = TasksResource::extract(json!({"tasks": [
            {"name": "no id"},
            "not an object",
            {"id": "t1", "status": "BLOCKED", "name": null}
        ]}))
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "t1");

        let moods = MoodsResource::extract(json!([{"id": null}, {"id": "m1", "mood": 3}])).unwrap();
        assert_eq!(moods.len(), 1);
        assert_eq!(moods[0].mood, "3");
    }

    #[test]
    fn test_list_field_of_wrong_type_is_empty() {
        assert!(NotesResource::extract(json!({"notes": {"n1": {}}})).unwrap().is_empty());
        assert!(RoutinesResource::extract(json!({"routines": "none"})).unwrap().is_empty());
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("Tasks".parse::<ResourceKind>().unwrap(), ResourceKind::Tasks);
        assert_eq!("members".parse::<ResourceKind>().unwrap(), ResourceKind::TeamData);
        assert!("widgets".parse::<ResourceKind>().is_err());
    }
}
