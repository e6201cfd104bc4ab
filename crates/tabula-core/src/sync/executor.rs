//! Save executor: one write at a time, self-notification window.

use std::sync::Arc;

use super::state::{Document, EngineState};
use super::SyncEngine;
use crate::error::Result;
use crate::factory::validate_required;
use crate::models::Workspace;
use crate::persistence::{PersistencePort, SaveReceipt};

/// What a call to [`SyncEngine::save`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The pending payload was written.
    Saved(SaveReceipt),
    /// Another save was in flight; the request was recorded and the
    /// debounce timer is re-armed once that save finishes.
    Deferred,
    /// No workspace or nothing to write.
    Skipped,
}

struct SaveJob {
    workspace: Workspace,
    payload: Arc<Document>,
    revision: u64,
}

enum SaveStart {
    Run(SaveJob),
    Deferred,
    Skipped,
}

/// Clears the saving flag if a save is dropped before it completes.
struct InFlightGuard<'a, P: PersistencePort> {
    engine: &'a SyncEngine<P>,
    finished: bool,
}

impl<P: PersistencePort> Drop for InFlightGuard<'_, P> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::debug!("Save cancelled before completion");
        self.engine.inner.update(|state| state.saving = false);
    }
}

impl<P: PersistencePort> SyncEngine<P> {
    /// Write the pending payload.
    ///
    /// The suppression deadline is set before the write starts so that change
    /// notifications caused by the write itself are ignored. On failure the
    /// document stays dirty and the error is shown in the status; nothing is
    /// retried until the next trigger.
    pub async fn save(&self) -> Result<SaveOutcome> {
        let job = match self.inner.update(|state| self.begin_save(state)) {
            SaveStart::Run(job) => job,
            SaveStart::Deferred => {
                tracing::debug!("Save already in flight, deferring");
                return Ok(SaveOutcome::Deferred);
            }
            SaveStart::Skipped => return Ok(SaveOutcome::Skipped),
        };

        for issue in validate_required(&job.payload.schema, &job.payload.rows) {
            tracing::warn!("{issue}");
        }

        let mut guard = InFlightGuard {
            engine: self,
            finished: false,
        };
        let result = self
            .inner
            .port
            .save(&job.workspace, &job.payload.rows, &job.payload.schema)
            .await;
        guard.finished = true;

        self.inner
            .update(|state| self.finish_save(state, job, result))
            .map(SaveOutcome::Saved)
    }

    /// Save regardless of the dirty flag, waiting out any save in flight.
    pub async fn save_now(&self) -> Result<SaveOutcome> {
        loop {
            self.wait_for_idle().await;
            match self.save().await? {
                SaveOutcome::Deferred => continue,
                outcome => return Ok(outcome),
            }
        }
    }

    fn begin_save(&self, state: &mut EngineState) -> SaveStart {
        let (Some(workspace), Some(payload)) = (state.workspace.clone(), state.pending.clone())
        else {
            return SaveStart::Skipped;
        };

        if state.saving {
            state.save_requested = true;
            return SaveStart::Deferred;
        }

        state.cancel_timer();
        state.saving = true;
        state.ignore_until = Some(self.inner.clock.now() + self.inner.config.suppression_window());

        SaveStart::Run(SaveJob {
            workspace,
            payload,
            revision: state.revision,
        })
    }

    fn finish_save(
        &self,
        state: &mut EngineState,
        job: SaveJob,
        result: Result<SaveReceipt>,
    ) -> Result<SaveReceipt> {
        state.saving = false;

        let result = match result {
            Ok(receipt) => {
                tracing::info!(
                    "Saved {} rows to {}",
                    receipt.row_count,
                    job.workspace.data_path.display()
                );
                if state.workspace.as_ref() == Some(&job.workspace) {
                    state.baseline = Some(job.payload);
                }
                if state.revision == job.revision {
                    state.dirty = false;
                }
                state.last_error = None;
                state.last_saved = Some(receipt.clone());
                Ok(receipt)
            }
            Err(error) => {
                tracing::warn!(
                    "Failed to save {}: {error}",
                    job.workspace.data_path.display()
                );
                state.last_error = Some(error.to_string());
                Err(error)
            }
        };

        if std::mem::take(&mut state.save_requested) && state.dirty && state.timer.is_none() {
            tracing::debug!("Re-arming autosave after deferred trigger");
            self.arm_timer(state);
        }

        result
    }
}
