//! Table synchronization engine.
//!
//! [`SyncEngine`] owns the in-memory document for one workspace at a time. It
//! debounces local mutations into autosaves, keeps at most one save in flight,
//! ignores change notifications caused by its own writes, and turns genuine
//! external changes into an explicit conflict the caller must resolve.
//!
//! All state lives behind one lock that is never held across an await, so
//! every transition is a short non-overlapping step. Background work (the
//! debounce timer and the change subscription) runs on spawned tokio tasks that
//! only hold a weak reference to the engine.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{Row, Snapshot, TableSchema, Workspace};
use crate::persistence::{PersistencePort, SaveReceipt};

mod clock;
mod conflict;
mod executor;
mod scheduler;
mod snapshot;
mod state;
mod status;

pub use clock::{Clock, TokioClock};
pub use conflict::{ConflictCheck, ConflictState, IgnoreReason};
pub use executor::SaveOutcome;
pub use scheduler::AutosaveMode;
pub use state::Document;
pub use status::SyncStatus;

use state::EngineState;

/// Handle to the sync engine. Clones share the same engine.
pub struct SyncEngine<P: PersistencePort> {
    inner: Arc<EngineInner<P>>,
}

impl<P: PersistencePort> Clone for SyncEngine<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<P> {
    port: P,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    state: Mutex<EngineState>,
    status: watch::Sender<SyncStatus>,
}

impl<P> EngineInner<P> {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one state transition and publish the resulting status.
    fn update<R>(&self, transition: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.lock();
        let result = transition(&mut state);
        let next = SyncStatus::project(&state);
        self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        result
    }

    fn read<R>(&self, view: impl FnOnce(&EngineState) -> R) -> R {
        view(&self.lock())
    }
}

impl<P> Drop for EngineInner<P> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.cancel_timer();
        state.stop_subscription();
    }
}

impl<P: PersistencePort> SyncEngine<P> {
    /// Create an engine over `port` using tokio's clock.
    ///
    /// The engine spawns tokio tasks, so it must be driven from a runtime.
    pub fn new(port: P, config: EngineConfig) -> Self {
        Self::with_clock(port, config, Arc::new(TokioClock))
    }

    pub fn with_clock(port: P, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            inner: Arc::new(EngineInner {
                port,
                clock,
                config,
                state: Mutex::new(EngineState::default()),
                status,
            }),
        }
    }

    pub fn port(&self) -> &P {
        &self.inner.port
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Current status projection.
    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver that wakes on every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn workspace(&self) -> Option<Workspace> {
        self.inner.read(|state| state.workspace.clone())
    }

    /// Rows and schema as last handed to the engine.
    pub fn document(&self) -> Option<Arc<Document>> {
        self.inner.read(|state| state.document.clone())
    }

    /// Current document bundled with its workspace.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.inner.read(|state| {
            let workspace = state.workspace.clone()?;
            let document = state.document.as_ref()?;
            Some(Snapshot::new(
                document.rows.clone(),
                document.schema.clone(),
                workspace,
            ))
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.read(|state| state.dirty)
    }

    pub fn is_saving(&self) -> bool {
        self.inner.read(|state| state.saving)
    }

    pub fn conflict(&self) -> Option<ConflictState> {
        self.inner.read(|state| state.conflict.clone())
    }

    pub fn last_saved(&self) -> Option<SaveReceipt> {
        self.inner.read(|state| state.last_saved.clone())
    }

    /// Apply a pure edit to the current document and schedule an autosave.
    ///
    /// `edit` receives the current schema and rows and returns replacements,
    /// typically by calling one of the [`crate::factory`] functions. An error
    /// from `edit` leaves the document untouched.
    pub fn edit<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&TableSchema, &[Row]) -> Result<(TableSchema, Vec<Row>)>,
    {
        let document = self.document().ok_or(Error::NoWorkspace)?;
        let (schema, rows) = edit(&document.schema, &document.rows)?;
        self.notify_mutation(rows, schema, AutosaveMode::Active)
    }

    /// Open an existing table. See [`SyncEngine::create_workspace`].
    pub async fn open_workspace(&self, data_path: impl AsRef<Path>) -> Result<Workspace> {
        self.switch_workspace(data_path.as_ref(), snapshot::Source::Load)
            .await
    }

    /// Create a new table and open it.
    ///
    /// The current workspace is unsubscribed and flushed first. If the new
    /// table cannot be loaded the current one stays open.
    pub async fn create_workspace(&self, data_path: impl AsRef<Path>) -> Result<Workspace> {
        self.switch_workspace(data_path.as_ref(), snapshot::Source::Create)
            .await
    }

    /// Wait until no save is in flight.
    pub async fn wait_for_idle(&self) {
        let mut status = self.inner.status.subscribe();
        // The sender lives as long as the engine, so this cannot fail.
        let _ = status.wait_for(|status| !status.saving).await;
    }
}
