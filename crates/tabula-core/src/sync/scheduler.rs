//! Autosave scheduler: debounces local mutations into one save.

use std::sync::Arc;

use super::state::{DebounceTimer, Document, EngineState};
use super::{SaveOutcome, SyncEngine};
use crate::error::{Error, Result};
use crate::models::{Row, TableSchema};
use crate::persistence::PersistencePort;

/// Whether a mutation should schedule an autosave
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutosaveMode {
    /// A local edit: mark dirty and (re)start the debounce timer.
    #[default]
    Active,
    /// Programmatic replacement: record the payload only.
    Suspended,
}

impl<P: PersistencePort> SyncEngine<P> {
    /// Record a new document state.
    ///
    /// The rows and schema become the pending payload, replacing any earlier
    /// one. In [`AutosaveMode::Active`] the document is marked dirty and the
    /// debounce timer restarts, so only the last mutation of a burst saves.
    pub fn notify_mutation(
        &self,
        rows: Vec<Row>,
        schema: TableSchema,
        mode: AutosaveMode,
    ) -> Result<()> {
        let document = Arc::new(Document::new(rows, schema));
        self.inner.update(|state| {
            if state.workspace.is_none() {
                return Err(Error::NoWorkspace);
            }
            self.record_mutation(state, document, mode);
            Ok(())
        })
    }

    pub(super) fn record_mutation(
        &self,
        state: &mut EngineState,
        document: Arc<Document>,
        mode: AutosaveMode,
    ) {
        state.document = Some(Arc::clone(&document));
        state.pending = Some(document);
        state.revision += 1;

        match mode {
            AutosaveMode::Active => {
                state.dirty = true;
                self.arm_timer(state);
            }
            AutosaveMode::Suspended => state.cancel_timer(),
        }
    }

    /// Start a one-shot debounce timer, replacing any running one.
    pub(super) fn arm_timer(&self, state: &mut EngineState) {
        state.cancel_timer();
        state.timer_generation += 1;
        let generation = state.timer_generation;
        let quiet_period = self.inner.config.quiet_period();
        let engine = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let Some(inner) = engine.upgrade() else {
                return;
            };
            let engine = SyncEngine { inner };

            // Claim the timer first so a restart during the save cannot abort it.
            // An open conflict holds autosave until it is resolved.
            let due = engine.inner.update(|state| {
                state.claim_timer(generation) && state.dirty && state.conflict.is_none()
            });
            if !due {
                return;
            }

            tracing::debug!("Quiet period elapsed, autosaving");
            if let Err(error) = engine.save().await {
                tracing::debug!("Autosave failed: {error}");
            }
        });

        state.timer = Some(DebounceTimer { generation, handle });
    }

    /// Save now if there are unsaved changes, waiting for any save in flight.
    ///
    /// Call before switching or closing a workspace so no edit is lost.
    pub async fn flush(&self) -> Result<()> {
        loop {
            self.wait_for_idle().await;
            if !self.is_dirty() {
                return Ok(());
            }
            match self.save().await? {
                SaveOutcome::Deferred => continue,
                SaveOutcome::Saved(_) | SaveOutcome::Skipped => return Ok(()),
            }
        }
    }
}
