//! Writes against the backend, mirrored into the store.
//!
//! The store itself never writes to the server. `TeamActions` pairs each
//! write with the matching local mutation: updates and deletes are applied
//! locally first and reconciled with a forced refetch when the server
//! rejects them; creates are added once the server has assigned an id.

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::api::ApiError;
use crate::cache::{DataStore, Resource, ResourceKind, TasksResource};
use crate::models::{Record, TaskStatus};

#[derive(Clone)]
pub struct TeamActions {
    store: DataStore,
}

/// Create endpoints answer either with the item or with `{ "<singular>": item }`.
fn created_item<I: Record>(kind: ResourceKind, body: Value) -> Result<I, ApiError> {
    let singular = kind.name().trim_end_matches('s');
    let item = match body {
        Value::Object(mut map) if matches!(map.get(singular), Some(Value::Object(_))) => {
            map.remove(singular).unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(item)
        .map_err(|e| ApiError::InvalidResponse(format!("Unexpected created {}: {}", kind, e)))
}

impl TeamActions {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// POST a new item and put the server's version at the front of the list.
    pub async fn create<R, I>(&self, team_id: &str, body: &Value) -> Result<I, ApiError>
    where
        R: Resource<Value = Vec<I>>,
        I: Record,
    {
        let response = self
            .store
            .api()
            .post_json(&R::KIND.collection_path(team_id), body)
            .await?;
        let item: I = created_item(R::KIND, response)?;
        self.store.add::<R, I>(team_id, item.clone());
        Ok(item)
    }

    /// Patch locally, then on the server. A rejected patch triggers a forced
    /// refetch so the list matches the server again.
    pub async fn update<R, I>(
        &self,
        team_id: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), ApiError>
    where
        R: Resource<Value = Vec<I>>,
        I: Record,
    {
        self.store.update::<R, I>(team_id, id, &patch);

        let path = R::KIND.item_path(team_id, id);
        if let Err(e) = self.store.api().patch_json(&path, &patch).await {
            warn!(resource = %R::KIND, team_id, id, error = %e, "Update rejected, resyncing");
            self.store.fetch::<R>(team_id, true).await;
            return Err(e);
        }
        Ok(())
    }

    /// Remove locally, then on the server. There is no per-item rollback:
    /// a failed delete is reconciled with a forced refetch.
    pub async fn delete<R, I>(&self, team_id: &str, id: &str) -> Result<(), ApiError>
    where
        R: Resource<Value = Vec<I>>,
        I: Record,
    {
        self.store.remove::<R, I>(team_id, id);

        if let Err(e) = self.store.api().delete(&R::KIND.item_path(team_id, id)).await {
            warn!(resource = %R::KIND, team_id, id, error = %e, "Delete rejected, resyncing");
            self.store.fetch::<R>(team_id, true).await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn set_task_status(
        &self,
        team_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), ApiError> {
        let mut patch = Map::new();
        patch.insert("status".to_string(), json!(status));
        self.update::<TasksResource, _>(team_id, task_id, patch).await
    }

    /// Moods are never edited locally; a new entry just makes the cached log
    /// stale.
    pub async fn log_mood(&self, team_id: &str, body: &Value) -> Result<(), ApiError> {
        self.store
            .api()
            .post_json(&ResourceKind::Moods.collection_path(team_id), body)
            .await?;
        self.store.invalidate_moods(team_id);
        Ok(())
    }
}
