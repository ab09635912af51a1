//! The team data store.
//!
//! One `DataStore` is built at startup and cloned into every consumer. Reads
//! go through `fetch`, which serves fresh cache entries without touching the
//! network. Writes made by the user are mirrored locally with `add`, `update`
//! and `remove` before the server confirms them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::entry::CacheEntry;
use super::resource::{
    MoodsResource, Namespace, NotesResource, Resource, ResourceKind, RoutinesResource,
    StatusKey, TasksResource, TeamDataResource,
};
use super::snapshot::{Snapshot, SnapshotFile};
use crate::api::ApiClient;
use crate::models::{Mood, Note, Record, Routine, Task, TeamData};

/// Everything the store holds. Only the store's own methods write to it.
#[derive(Debug, Default)]
pub struct StoreState {
    pub(crate) team_data: Namespace<TeamData>,
    pub(crate) tasks: Namespace<Vec<Task>>,
    pub(crate) routines: Namespace<Vec<Routine>>,
    pub(crate) notes: Namespace<Vec<Note>>,
    pub(crate) moods: Namespace<Vec<Mood>>,
    pub(crate) loading: HashSet<StatusKey>,
    pub(crate) errors: HashMap<StatusKey, String>,
}

impl StoreState {
    fn invalidate(&mut self, kind: ResourceKind, team_id: &str) -> bool {
        match kind {
            ResourceKind::TeamData => self.team_data.invalidate(team_id),
            ResourceKind::Tasks => self.tasks.invalidate(team_id),
            ResourceKind::Routines => self.routines.invalidate(team_id),
            ResourceKind::Notes => self.notes.invalidate(team_id),
            ResourceKind::Moods => self.moods.invalidate(team_id),
        }
    }

    /// Age display and staleness of one entry, if cached.
    fn describe(&self, kind: ResourceKind, team_id: &str) -> Option<(String, bool)> {
        fn of<V>(entry: Option<&CacheEntry<V>>, kind: ResourceKind) -> Option<(String, bool)> {
            entry.map(|e| (e.age_display(), e.is_stale(kind.ttl(), Utc::now())))
        }

        match kind {
            ResourceKind::TeamData => of(self.team_data.get(team_id), kind),
            ResourceKind::Tasks => of(self.tasks.get(team_id), kind),
            ResourceKind::Routines => of(self.routines.get(team_id), kind),
            ResourceKind::Notes => of(self.notes.get(team_id), kind),
            ResourceKind::Moods => of(self.moods.get(team_id), kind),
        }
    }
}

/// Per-resource summary for one team.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceStatus {
    pub kind: ResourceKind,
    /// `None` when nothing is cached yet.
    pub age: Option<String>,
    pub stale: bool,
    pub loading: bool,
    pub error: Option<String>,
}

/// Result of refreshing every resource of a team at once.
#[derive(Debug, Clone, Default)]
pub struct TeamBundle {
    pub team_data: Option<TeamData>,
    pub tasks: Vec<Task>,
    pub routines: Vec<Routine>,
    pub notes: Vec<Note>,
    pub moods: Vec<Mood>,
}

struct Inner {
    api: ApiClient,
    state: Mutex<StoreState>,
    file: Option<SnapshotFile>,
    /// Bumped under the state lock for every snapshot taken.
    revision: AtomicU64,
    /// Revision last written to `file`. Older snapshots are discarded.
    written: Mutex<u64>,
    changes: watch::Sender<u64>,
}

/// Shared handle to the store. Clone is cheap.
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<Inner>,
}

/// Shallow merge of `patch` into the JSON form of `item`.
fn merge_patch<I: Record>(item: &I, patch: &Map<String, Value>) -> Result<I, serde_json::Error> {
    let mut value = serde_json::to_value(item)?;
    if let Value::Object(ref mut fields) = value {
        for (key, new_value) in patch {
            fields.insert(key.clone(), new_value.clone());
        }
    }
    serde_json::from_value(value)
}

impl DataStore {
    /// A store that lives only in memory.
    pub fn new(api: ApiClient) -> Self {
        Self::from_parts(api, StoreState::default(), None)
    }

    /// A store backed by `file`. Whatever can be read from it is restored;
    /// a missing or unreadable file gives an empty store.
    pub fn restore(api: ApiClient, file: SnapshotFile) -> Self {
        let state = match file.load() {
            Ok(Some(snapshot)) => {
                let state = snapshot.into_state();
                info!(
                    path = %file.path().display(),
                    teams = state.team_data.len(),
                    "Restored data store"
                );
                state
            }
            Ok(None) => {
                debug!(path = %file.path().display(), "No store snapshot, starting cold");
                StoreState::default()
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable store snapshot");
                StoreState::default()
            }
        };
        Self::from_parts(api, state, Some(file))
    }

    fn from_parts(api: ApiClient, state: StoreState, file: Option<SnapshotFile>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(state),
                file,
                revision: AtomicU64::new(0),
                written: Mutex::new(0),
                changes,
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Receiver whose value is bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Write a captured snapshot out unless a newer one already landed.
    /// Failures are logged, never returned.
    fn persist(&self, snapshot: Snapshot, revision: u64) {
        let Some(ref file) = self.inner.file else {
            return;
        };
        let mut written = self.inner.written.lock().unwrap_or_else(PoisonError::into_inner);
        if revision <= *written {
            debug!(revision, written = *written, "Skipping outdated snapshot");
            return;
        }
        match file.save(&snapshot) {
            Ok(()) => *written = revision,
            Err(e) => {
                warn!(path = %file.path().display(), error = %e, "Failed to persist data store")
            }
        }
    }

    /// Cached values changed: snapshot under the lock, write after releasing
    /// it, then tell subscribers.
    fn commit(&self, state: MutexGuard<'_, StoreState>) {
        let captured = match self.inner.file {
            Some(_) => match Snapshot::capture(&state) {
                Ok(snapshot) => {
                    Some((snapshot, self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1))
                }
                Err(e) => {
                    warn!(error = %e, "Failed to capture data store snapshot");
                    None
                }
            },
            None => None,
        };
        drop(state);

        if let Some((snapshot, revision)) = captured {
            self.persist(snapshot, revision);
        }
        self.notify();
    }

    // =========================================================================
    // Fetch engine
    // =========================================================================

    /// Read a resource for a team, going to the network only when the cache
    /// is missing, stale, or `force` is set.
    ///
    /// Never fails: on a network error the message lands in the error map and
    /// the previously cached value (if any) is returned.
    pub async fn fetch<R: Resource>(&self, team_id: &str, force: bool) -> Option<R::Value> {
        if team_id.is_empty() {
            warn!(resource = %R::KIND, "Fetch requested without a team id");
            return None;
        }

        let key = StatusKey::new(R::KIND, team_id);

        {
            let mut state = self.lock();
            if !force {
                let now = Utc::now();
                let hit = R::namespace(&state)
                    .get(team_id)
                    .filter(|entry| !entry.is_stale(R::KIND.ttl(), now))
                    .map(|entry| entry.value.clone());

                if let Some(value) = hit {
                    debug!(key = %key, "Cache hit");
                    // An earlier request may still be in flight; the hit wins.
                    if state.loading.remove(&key) {
                        drop(state);
                        self.notify();
                    }
                    return Some(value);
                }
            }

            debug!(key = %key, force, "Cache miss, fetching");
            state.loading.insert(key.clone());
            state.errors.remove(&key);
        }
        self.notify();

        let result = match self
            .inner
            .api
            .get_json(&R::KIND.collection_path(team_id), R::KIND.timeout())
            .await
        {
            Ok(body) => R::extract(body),
            Err(e) => Err(e),
        };

        let mut state = self.lock();
        state.loading.remove(&key);

        match result {
            Ok(value) => {
                state.errors.remove(&key);
                R::namespace_mut(&mut state).insert(team_id, CacheEntry::fresh(value.clone()));
                self.commit(state);
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Fetch failed, serving cached value");
                state.errors.insert(key, e.to_string());
                let fallback = R::namespace(&state).get(team_id).map(|entry| entry.value.clone());
                drop(state);
                self.notify();
                fallback
            }
        }
    }

    /// Cached value regardless of freshness, without any network call.
    pub fn cached<R: Resource>(&self, team_id: &str) -> Option<R::Value> {
        R::namespace(&self.lock())
            .get(team_id)
            .map(|entry| entry.value.clone())
    }

    pub async fn fetch_team_data(&self, team_id: &str, force: bool) -> Option<TeamData> {
        self.fetch::<TeamDataResource>(team_id, force).await
    }

    pub async fn fetch_tasks(&self, team_id: &str, force: bool) -> Vec<Task> {
        self.fetch::<TasksResource>(team_id, force).await.unwrap_or_default()
    }

    pub async fn fetch_routines(&self, team_id: &str, force: bool) -> Vec<Routine> {
        self.fetch::<RoutinesResource>(team_id, force).await.unwrap_or_default()
    }

    pub async fn fetch_notes(&self, team_id: &str, force: bool) -> Vec<Note> {
        self.fetch::<NotesResource>(team_id, force).await.unwrap_or_default()
    }

    pub async fn fetch_moods(&self, team_id: &str, force: bool) -> Vec<Mood> {
        self.fetch::<MoodsResource>(team_id, force).await.unwrap_or_default()
    }

    /// Fetch all five resources of a team concurrently.
    pub async fn refresh_team(&self, team_id: &str, force: bool) -> TeamBundle {
        let (team_data, tasks, routines, notes, moods) = futures::join!(
            self.fetch_team_data(team_id, force),
            self.fetch_tasks(team_id, force),
            self.fetch_routines(team_id, force),
            self.fetch_notes(team_id, force),
            self.fetch_moods(team_id, force),
        );

        TeamBundle {
            team_data,
            tasks,
            routines,
            notes,
            moods,
        }
    }

    // =========================================================================
    // Optimistic mutations
    //
    // These only change cached content. Timestamps, loading flags and errors
    // are left alone: a local edit says nothing about server freshness.
    // =========================================================================

    /// Put `item` at the front of the team's list.
    pub fn add<R, I>(&self, team_id: &str, item: I)
    where
        R: Resource<Value = Vec<I>>,
        I: Record,
    {
        let mut state = self.lock();
        let namespace = R::namespace_mut(&mut state);
        match namespace.get_mut(team_id) {
            Some(entry) => entry.value.insert(0, item),
            None => namespace.insert(team_id, CacheEntry::unconfirmed(vec![item])),
        }
        self.commit(state);
    }

    /// Shallow-merge `patch` into the item with the given id.
    pub fn update<R, I>(&self, team_id: &str, id: &str, patch: &Map<String, Value>)
    where
        R: Resource<Value = Vec<I>>,
        I: Record,
    {
        let mut state = self.lock();
        let Some(entry) = R::namespace_mut(&mut state).get_mut(team_id) else {
            return;
        };

        let mut changed = false;
        for item in entry.value.iter_mut().filter(|item| item.id() == id) {
            match merge_patch(item, patch) {
                Ok(merged) => {
                    *item = merged;
                    changed = true;
                }
                Err(e) => {
                    warn!(resource = %R::KIND, id, error = %e, "Patch does not fit, ignoring");
                }
            }
        }

        if changed {
            self.commit(state);
        }
    }

    /// Drop the item with the given id.
    pub fn remove<R, I>(&self, team_id: &str, id: &str)
    where
        R: Resource<Value = Vec<I>>,
        I: Record,
    {
        let mut state = self.lock();
        let Some(entry) = R::namespace_mut(&mut state).get_mut(team_id) else {
            return;
        };

        let before = entry.value.len();
        entry.value.retain(|item| item.id() != id);
        if entry.value.len() != before {
            self.commit(state);
        }
    }

    pub fn add_task(&self, team_id: &str, task: Task) {
        self.add::<TasksResource, _>(team_id, task);
    }

    pub fn update_task(&self, team_id: &str, id: &str, patch: &Map<String, Value>) {
        self.update::<TasksResource, _>(team_id, id, patch);
    }

    pub fn remove_task(&self, team_id: &str, id: &str) {
        self.remove::<TasksResource, _>(team_id, id);
    }

    pub fn add_routine(&self, team_id: &str, routine: Routine) {
        self.add::<RoutinesResource, _>(team_id, routine);
    }

    pub fn update_routine(&self, team_id: &str, id: &str, patch: &Map<String, Value>) {
        self.update::<RoutinesResource, _>(team_id, id, patch);
    }

    pub fn remove_routine(&self, team_id: &str, id: &str) {
        self.remove::<RoutinesResource, _>(team_id, id);
    }

    pub fn add_note(&self, team_id: &str, note: Note) {
        self.add::<NotesResource, _>(team_id, note);
    }

    pub fn update_note(&self, team_id: &str, id: &str, patch: &Map<String, Value>) {
        self.update::<NotesResource, _>(team_id, id, patch);
    }

    pub fn remove_note(&self, team_id: &str, id: &str) {
        self.remove::<NotesResource, _>(team_id, id);
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Mark one resource of a team stale. The cached value stays available.
    pub fn invalidate(&self, kind: ResourceKind, team_id: &str) {
        let mut state = self.lock();
        if state.invalidate(kind, team_id) {
            debug!(resource = %kind, team_id, "Invalidated");
            self.commit(state);
        }
    }

    /// Mark every resource of a team stale, e.g. after a membership change.
    pub fn invalidate_all(&self, team_id: &str) {
        let mut state = self.lock();
        let mut changed = false;
        for kind in ResourceKind::ALL {
            changed |= state.invalidate(kind, team_id);
        }
        if changed {
            debug!(team_id, "Invalidated all resources");
            self.commit(state);
        }
    }

    pub fn invalidate_team_data(&self, team_id: &str) {
        self.invalidate(ResourceKind::TeamData, team_id);
    }

    pub fn invalidate_tasks(&self, team_id: &str) {
        self.invalidate(ResourceKind::Tasks, team_id);
    }

    pub fn invalidate_routines(&self, team_id: &str) {
        self.invalidate(ResourceKind::Routines, team_id);
    }

    pub fn invalidate_notes(&self, team_id: &str) {
        self.invalidate(ResourceKind::Notes, team_id);
    }

    pub fn invalidate_moods(&self, team_id: &str) {
        self.invalidate(ResourceKind::Moods, team_id);
    }

    // =========================================================================
    // Loading and error bookkeeping
    // =========================================================================

    pub fn set_loading(&self, kind: ResourceKind, team_id: &str, loading: bool) {
        let key = StatusKey::new(kind, team_id);
        let changed = {
            let mut state = self.lock();
            if loading {
                state.loading.insert(key)
            } else {
                state.loading.remove(&key)
            }
        };
        if changed {
            self.notify();
        }
    }

    pub fn set_error(&self, kind: ResourceKind, team_id: &str, error: Option<String>) {
        let key = StatusKey::new(kind, team_id);
        {
            let mut state = self.lock();
            match error {
                Some(message) => {
                    state.errors.insert(key, message);
                }
                None => {
                    state.errors.remove(&key);
                }
            }
        }
        self.notify();
    }

    pub fn is_loading(&self, kind: ResourceKind, team_id: &str) -> bool {
        self.lock().loading.contains(&StatusKey::new(kind, team_id))
    }

    pub fn error(&self, kind: ResourceKind, team_id: &str) -> Option<String> {
        self.lock().errors.get(&StatusKey::new(kind, team_id)).cloned()
    }

    /// Summary of every resource for one team.
    pub fn status(&self, team_id: &str) -> Vec<ResourceStatus> {
        let state = self.lock();
        ResourceKind::ALL
            .into_iter()
            .map(|kind| {
                let key = StatusKey::new(kind, team_id);
                let described = state.describe(kind, team_id);
                ResourceStatus {
                    kind,
                    stale: described.as_ref().map(|(_, stale)| *stale).unwrap_or(true),
                    age: described.map(|(age, _)| age),
                    loading: state.loading.contains(&key),
                    error: state.errors.get(&key).cloned(),
                }
            })
            .collect()
    }
}
