//! # Projects
//!
//! Persistence contract for saved programs. A project record carries the
//! workspace snapshot as opaque JSON; the store never interprets it.

use crate::blocks::BlockRegistry;
use crate::error::PersistenceError;
use crate::serializer;
use crate::workspace::Workspace;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub board_id: String,
    pub workspace_snapshot: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub owner_id: String,
    pub name: String,
    pub board_id: String,
    #[serde(default)]
    pub workspace_snapshot: serde_json::Value,
}

/// Partial update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub board_id: Option<String>,
    pub workspace_snapshot: Option<serde_json::Value>,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<ProjectRecord, PersistenceError>;

    /// Apply `update` and bump `updated_at`.
    async fn update(&self, id: &str, update: ProjectUpdate) -> Result<ProjectRecord, PersistenceError>;

    async fn create(&self, project: NewProject) -> Result<ProjectRecord, PersistenceError>;

    async fn delete(&self, id: &str) -> Result<(), PersistenceError>;

    /// Projects owned by `owner_id`, most recently updated first.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ProjectRecord>, PersistenceError>;
}

/// Process-local store, mainly for tests and offline use.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: IndexMap<String, ProjectRecord>,
    next_id: u64,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn get(&self, id: &str) -> Result<ProjectRecord, PersistenceError> {
        self.inner
            .lock()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, update: ProjectUpdate) -> Result<ProjectRecord, PersistenceError> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(board_id) = update.board_id {
            record.board_id = board_id;
        }
        if let Some(snapshot) = update.workspace_snapshot {
            record.workspace_snapshot = snapshot;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn create(&self, project: NewProject) -> Result<ProjectRecord, PersistenceError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let record = ProjectRecord {
            id: format!("project-{}", inner.next_id),
            owner_id: project.owner_id,
            name: project.name,
            board_id: project.board_id,
            workspace_snapshot: project.workspace_snapshot,
            updated_at: Utc::now(),
        };
        inner.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .records
            .shift_remove(id)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ProjectRecord>, PersistenceError> {
        let mut owned: Vec<ProjectRecord> = self
            .inner
            .lock()
            .records
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(owned)
    }
}

/// Load a project into a workspace.
///
/// Store failures propagate. A snapshot that cannot be reconstructed yields an
/// empty program on the project's board (or the default board when the stored
/// id is unknown).
pub async fn open_project(
    store: &dyn ProjectStore,
    registry: Arc<BlockRegistry>,
    id: &str,
) -> Result<(ProjectRecord, Workspace), PersistenceError> {
    let record = store.get(id).await?;
    let mut workspace = serializer::load_value(registry, record.workspace_snapshot.clone());

    // The record's board wins over whatever the snapshot carried.
    if workspace.board_id() != record.board_id {
        if let Err(e) = workspace.set_board(&record.board_id) {
            tracing::warn!("[PROJECT] Project '{}': {}; keeping {}", id, e, workspace.board_id());
        }
    }

    tracing::info!("[PROJECT] Opened '{}' ({} blocks)", record.name, workspace.len());
    Ok((record, workspace))
}

/// Write `workspace` back to project `id`. The workspace is never modified.
pub async fn save_project(
    store: &dyn ProjectStore,
    id: &str,
    workspace: &Workspace,
) -> Result<ProjectRecord, PersistenceError> {
    let snapshot = serializer::save(workspace).to_value()?;
    let update = ProjectUpdate {
        name: None,
        board_id: Some(workspace.board_id().to_string()),
        workspace_snapshot: Some(snapshot),
    };
    let record = store.update(id, update).await.map_err(|e| {
        tracing::warn!("[PROJECT] Saving '{}' failed: {}", id, e);
        e
    })?;
    tracing::debug!("[PROJECT] Saved '{}' at {}", id, record.updated_at);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::RootKind;
    use crate::workspace::StatementTarget;

    fn registry() -> Arc<BlockRegistry> {
        Arc::new(BlockRegistry::builtin())
    }

    fn new_project(owner: &str, name: &str) -> NewProject {
        NewProject {
            owner_id: owner.to_string(),
            name: name.to_string(),
            board_id: "uno".to_string(),
            workspace_snapshot: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_crud() {
        let store = MemoryProjectStore::new();
        let created = store.create(new_project("ana", "Blink")).await.unwrap();
        assert_eq!(store.get(&created.id).await.unwrap(), created);

        let renamed = store
            .update(
                &created.id,
                ProjectUpdate {
                    name: Some("Blink fast".to_string()),
                    ..ProjectUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Blink fast");
        assert_eq!(renamed.board_id, "uno");
        assert!(renamed.updated_at >= created.updated_at);

        store.delete(&created.id).await.unwrap();
        assert!(matches!(
            store.get(&created.id).await,
            Err(PersistenceError::NotFound(_))
        ));
        assert!(store.delete(&created.id).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let store = MemoryProjectStore::new();
        let first = store.create(new_project("ana", "One")).await.unwrap();
        store.create(new_project("rui", "Other")).await.unwrap();
        let second = store.create(new_project("ana", "Two")).await.unwrap();
        store
            .update(&first.id, ProjectUpdate::default())
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_by_owner("ana")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"One".to_string()));
        assert!(names.contains(&second.name));
        assert!(store.list_by_owner("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_open() {
        let store = MemoryProjectStore::new();
        let record = store.create(new_project("ana", "Blink")).await.unwrap();

        let mut ws = Workspace::new(registry(), "esp32").unwrap();
        let setup = ws.root(RootKind::Setup).unwrap();
        let mode = ws.create_block("pin_mode").unwrap();
        ws.set_field(mode, "PIN", "18").unwrap();
        ws.connect_statement(setup, StatementTarget::slot("DO"), mode).unwrap();

        let saved = save_project(&store, &record.id, &ws).await.unwrap();
        assert_eq!(saved.board_id, "esp32");

        let (_, reopened) = open_project(&store, registry(), &record.id).await.unwrap();
        assert_eq!(reopened.board_id(), "esp32");
        assert_eq!(serializer::save(&reopened), serializer::save(&ws));
    }

    #[tokio::test]
    async fn test_open_with_unusable_snapshot() {
        let store = MemoryProjectStore::new();
        let record = store.create(new_project("ana", "Fresh")).await.unwrap();

        let (_, ws) = open_project(&store, registry(), &record.id).await.unwrap();
        assert_eq!(ws.len(), 2);
        assert_eq!(ws.board_id(), "uno");

        assert!(matches!(
            open_project(&store, registry(), "missing").await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_to_missing_project() {
        let store = MemoryProjectStore::new();
        let ws = Workspace::new(registry(), "nano").unwrap();
        let before = serializer::save(&ws);
        assert!(save_project(&store, "gone", &ws).await.is_err());
        assert_eq!(serializer::save(&ws), before);
    }
}
