//! In-memory persistence port.
//!
//! Tables live in a shared map keyed by data path. Handles are cheap clones of
//! the same store, so a test can keep one while the engine drives another, and
//! play the part of an external editor through [`MemoryStore::external_edit`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{ChangeNotification, ChangeStream, PersistencePort, SaveReceipt, CHANGE_BUFFER};
use crate::error::{Error, Result};
use crate::models::{normalize_data_path, Row, Snapshot, TableSchema, Workspace};
use crate::util::timestamp_now;

/// Something the store was asked to do, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Load(PathBuf),
    Create(PathBuf),
    SaveStarted(PathBuf),
    SaveFinished(PathBuf),
}

/// Payload of a completed save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRecord {
    pub workspace: Workspace,
    pub rows: Vec<Row>,
    pub schema: TableSchema,
}

#[derive(Debug, Clone)]
struct StoredTable {
    rows: Vec<Row>,
    schema: TableSchema,
}

#[derive(Debug, Default)]
struct StoreState {
    tables: HashMap<PathBuf, StoredTable>,
    subscribers: HashMap<PathBuf, Vec<mpsc::Sender<ChangeNotification>>>,
    saves: Vec<SaveRecord>,
    events: Vec<StoreEvent>,
    fail_next_save: Option<String>,
    saves_in_flight: usize,
    max_saves_in_flight: usize,
}

/// Persistence port that keeps tables in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    save_latency: Duration,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every save take `latency` before it completes.
    #[must_use]
    pub fn with_save_latency(mut self, latency: Duration) -> Self {
        self.save_latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a table without going through `create`.
    pub fn insert_table(
        &self,
        data_path: impl Into<PathBuf>,
        rows: Vec<Row>,
        schema: TableSchema,
    ) -> Result<Workspace> {
        let workspace = Workspace::for_data_path(data_path)?;
        self.lock()
            .tables
            .insert(workspace.data_path.clone(), StoredTable { rows, schema });
        Ok(workspace)
    }

    /// Current stored contents of a table.
    #[must_use]
    pub fn table(&self, workspace: &Workspace) -> Option<Snapshot> {
        self.lock()
            .tables
            .get(&workspace.data_path)
            .map(|table| Snapshot::new(table.rows.clone(), table.schema.clone(), workspace.clone()))
    }

    /// Replace a table's contents as another writer would, then notify subscribers.
    pub fn external_edit(&self, workspace: &Workspace, rows: Vec<Row>, schema: TableSchema) {
        self.lock()
            .tables
            .insert(workspace.data_path.clone(), StoredTable { rows, schema });
        self.emit_change(workspace);
    }

    /// Notify subscribers without changing anything.
    pub fn emit_change(&self, workspace: &Workspace) {
        let notification = ChangeNotification::for_workspace(workspace);
        let mut state = self.lock();
        if let Some(senders) = state.subscribers.get_mut(&workspace.data_path) {
            senders.retain(|sender| !sender.is_closed());
            for sender in senders.iter() {
                let _ = sender.try_send(notification.clone());
            }
        }
    }

    /// Fail the next save with `message`.
    pub fn fail_next_save(&self, message: impl Into<String>) {
        self.lock().fail_next_save = Some(message.into());
    }

    #[must_use]
    pub fn saves(&self) -> Vec<SaveRecord> {
        self.lock().saves.clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<StoreEvent> {
        self.lock().events.clone()
    }

    /// Highest number of saves that were ever running at once.
    #[must_use]
    pub fn max_concurrent_saves(&self) -> usize {
        self.lock().max_saves_in_flight
    }

    /// Open subscriptions for a workspace.
    #[must_use]
    pub fn subscriber_count(&self, workspace: &Workspace) -> usize {
        self.lock()
            .subscribers
            .get(&workspace.data_path)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    fn snapshot_at(&self, data_path: &Path) -> Result<Snapshot> {
        let workspace = Workspace::for_data_path(data_path)?;
        let state = self.lock();
        let table = state.tables.get(&workspace.data_path).ok_or_else(|| {
            Error::Load(format!("data file does not exist: {}", data_path.display()))
        })?;
        Ok(Snapshot::new(
            table.rows.clone(),
            table.schema.clone(),
            workspace,
        ))
    }
}

/// Tracks a running save; records its end even when the save is cancelled.
struct SaveInFlight {
    state: Arc<Mutex<StoreState>>,
    data_path: PathBuf,
}

impl SaveInFlight {
    fn start(store: &MemoryStore, data_path: &Path) -> Self {
        let mut state = store.lock();
        state.events.push(StoreEvent::SaveStarted(data_path.to_path_buf()));
        state.saves_in_flight += 1;
        state.max_saves_in_flight = state.max_saves_in_flight.max(state.saves_in_flight);
        Self {
            state: Arc::clone(&store.state),
            data_path: data_path.to_path_buf(),
        }
    }
}

impl Drop for SaveInFlight {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.saves_in_flight = state.saves_in_flight.saturating_sub(1);
        state
            .events
            .push(StoreEvent::SaveFinished(std::mem::take(&mut self.data_path)));
    }
}

impl PersistencePort for MemoryStore {
    async fn load(&self, data_path: &Path) -> Result<Snapshot> {
        self.lock()
            .events
            .push(StoreEvent::Load(data_path.to_path_buf()));
        self.snapshot_at(data_path)
    }

    async fn create(&self, data_path: &Path) -> Result<Snapshot> {
        let data_path = normalize_data_path(data_path)?;
        let workspace = Workspace::for_data_path(&data_path)
            .map_err(|error| Error::Create(error.to_string()))?;

        let mut state = self.lock();
        state.events.push(StoreEvent::Create(data_path.clone()));
        if state.tables.contains_key(&data_path) {
            return Err(Error::Create(format!(
                "a table named '{}' already exists",
                workspace.table_name()
            )));
        }

        let schema = TableSchema::initial(&workspace.table_name(), &timestamp_now());
        state.tables.insert(
            data_path,
            StoredTable {
                rows: Vec::new(),
                schema: schema.clone(),
            },
        );
        Ok(Snapshot::new(Vec::new(), schema, workspace))
    }

    async fn save(
        &self,
        workspace: &Workspace,
        rows: &[Row],
        schema: &TableSchema,
    ) -> Result<SaveReceipt> {
        let in_flight = SaveInFlight::start(self, &workspace.data_path);
        if !self.save_latency.is_zero() {
            tokio::time::sleep(self.save_latency).await;
        }
        drop(in_flight);

        let mut state = self.lock();
        if let Some(message) = state.fail_next_save.take() {
            return Err(Error::Save(message));
        }

        let updated_at = timestamp_now();
        let mut stored_schema = schema.clone();
        stored_schema.stamp_metadata(rows.len(), &updated_at);
        state.tables.insert(
            workspace.data_path.clone(),
            StoredTable {
                rows: rows.to_vec(),
                schema: stored_schema,
            },
        );
        state.saves.push(SaveRecord {
            workspace: workspace.clone(),
            rows: rows.to_vec(),
            schema: schema.clone(),
        });

        Ok(SaveReceipt {
            row_count: rows.len(),
            updated_at,
        })
    }

    async fn fetch_current(&self, workspace: &Workspace) -> Result<Snapshot> {
        self.snapshot_at(&workspace.data_path)
    }

    fn subscribe(&self, workspace: &Workspace) -> Result<ChangeStream> {
        let (sender, receiver) = mpsc::channel(CHANGE_BUFFER);
        self.lock()
            .subscribers
            .entry(workspace.data_path.clone())
            .or_default()
            .push(sender);
        Ok(ChangeStream::new(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_load() {
        let store = MemoryStore::new();
        let created = store.create(Path::new("/tables/tasks")).await.unwrap();
        assert_eq!(created.workspace.data_path, PathBuf::from("/tables/tasks.json"));

        let loaded = store.load(&created.workspace.data_path).await.unwrap();
        assert_eq!(loaded.schema.columns.len(), 4);
        assert_eq!(
            store.events(),
            vec![
                StoreEvent::Create(PathBuf::from("/tables/tasks.json")),
                StoreEvent::Load(PathBuf::from("/tables/tasks.json")),
            ]
        );
    }

    #[tokio::test]
    async fn create_rejects_existing() {
        let store = MemoryStore::new();
        store.create(Path::new("/tables/tasks.json")).await.unwrap();
        let error = store
            .create(Path::new("/tables/tasks.json"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Create(_)));
    }

    #[tokio::test]
    async fn load_unknown_table_fails() {
        let error = MemoryStore::new()
            .load(Path::new("/tables/none.json"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Load(_)));
    }

    #[tokio::test]
    async fn failed_save_leaves_table_untouched() {
        let store = MemoryStore::new();
        let snapshot = store.create(Path::new("/tables/tasks")).await.unwrap();
        store.fail_next_save("disk full");

        let mut row = Row::new();
        row.insert("title", json!("lost"));
        let error = store
            .save(&snapshot.workspace, &[row], &snapshot.schema)
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Failed to save table: disk full");
        assert!(store.table(&snapshot.workspace).unwrap().data.is_empty());
        assert!(store.saves().is_empty());
    }

    #[tokio::test]
    async fn external_edit_notifies_subscribers() {
        let store = MemoryStore::new();
        let snapshot = store.create(Path::new("/tables/tasks")).await.unwrap();
        let mut changes = store.subscribe(&snapshot.workspace).unwrap();
        assert_eq!(store.subscriber_count(&snapshot.workspace), 1);

        store.external_edit(&snapshot.workspace, Vec::new(), snapshot.schema.clone());
        let notification = changes.recv().await.unwrap();
        assert!(notification.concerns(&snapshot.workspace));

        drop(changes);
        assert_eq!(store.subscriber_count(&snapshot.workspace), 0);
    }
}
