//! Per-team, per-resource data store with TTL freshness.
//!
//! The store caches five resources for every team it has seen:
//! - Team data (members and roles), fresh for 5 minutes
//! - Tasks, routines and notes, fresh for 2 minutes
//! - Moods, fresh for 1 minute
//!
//! Values survive restarts through a JSON snapshot in the cache directory.
//! Loading flags and error messages do not.

pub mod entry;
pub mod resource;
pub mod snapshot;
pub mod store;

pub use entry::{is_stale, CacheEntry};
pub use resource::{
    MoodsResource, Namespace, NotesResource, Resource, ResourceKind, RoutinesResource,
    StatusKey, TasksResource, TeamDataResource,
};
pub use snapshot::{Snapshot, SnapshotFile, STORE_FILE};
pub use store::{DataStore, ResourceStatus, StoreState, TeamBundle};
