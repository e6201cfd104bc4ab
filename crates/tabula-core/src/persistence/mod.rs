//! Persistence port: the boundary between the sync engine and storage.
//!
//! The engine only ever exchanges whole [`Snapshot`]s with a port; there is no
//! delta protocol. Two adapters ship with the crate: [`FileStore`] for the
//! JSON workspace on disk and [`MemoryStore`] for tests.

use std::future::Future;
use std::path::{Path, PathBuf};

use notify::RecommendedWatcher;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{Row, Snapshot, TableSchema, Workspace};

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, SaveRecord, StoreEvent};

/// Buffered notifications per subscription. A full buffer already holds a
/// pending wake-up, so further notifications are dropped.
pub(crate) const CHANGE_BUFFER: usize = 16;

/// A workspace file changed on the storage side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub data_path: PathBuf,
    pub schema_path: PathBuf,
}

impl ChangeNotification {
    #[must_use]
    pub fn for_workspace(workspace: &Workspace) -> Self {
        Self {
            data_path: workspace.data_path.clone(),
            schema_path: workspace.schema_path.clone(),
        }
    }

    /// Whether the notification concerns the given workspace.
    #[must_use]
    pub fn concerns(&self, workspace: &Workspace) -> bool {
        workspace.owns_path(&self.data_path) || workspace.owns_path(&self.schema_path)
    }
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub row_count: usize,
    pub updated_at: String,
}

/// Receiving end of a workspace subscription. Dropping it unsubscribes.
pub struct ChangeStream {
    receiver: mpsc::Receiver<ChangeNotification>,
    _watcher: Option<RecommendedWatcher>,
}

impl ChangeStream {
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<ChangeNotification>) -> Self {
        Self {
            receiver,
            _watcher: None,
        }
    }

    /// A stream fed by a file watcher that lives as long as the stream.
    pub(crate) fn watched(
        receiver: mpsc::Receiver<ChangeNotification>,
        watcher: RecommendedWatcher,
    ) -> Self {
        Self {
            receiver,
            _watcher: Some(watcher),
        }
    }

    /// Next notification, or `None` once the store stops reporting changes.
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.receiver.recv().await
    }
}

/// Storage collaborator driven by the sync engine.
///
/// Implementations own file formats, atomic writes, and change detection.
/// Notifications may be duplicated or spurious; the engine copes with both.
pub trait PersistencePort: Send + Sync + 'static {
    /// Read the table bound to `data_path`.
    fn load(&self, data_path: &Path) -> impl Future<Output = Result<Snapshot>> + Send;

    /// Create a new, empty table. Fails when a table already exists there.
    fn create(&self, data_path: &Path) -> impl Future<Output = Result<Snapshot>> + Send;

    /// Durably write rows and schema to the workspace.
    fn save(
        &self,
        workspace: &Workspace,
        rows: &[Row],
        schema: &TableSchema,
    ) -> impl Future<Output = Result<SaveReceipt>> + Send;

    /// Re-read the workspace to decide whether a notification is a real change.
    fn fetch_current(&self, workspace: &Workspace)
        -> impl Future<Output = Result<Snapshot>> + Send;

    /// Start watching the workspace files.
    fn subscribe(&self, workspace: &Workspace) -> Result<ChangeStream>;
}
