//! Snapshot application and workspace lifecycle.

use std::path::Path;
use std::sync::Arc;

use super::scheduler::AutosaveMode;
use super::state::Document;
use super::SyncEngine;
use crate::error::Result;
use crate::factory::{backfill_rows, backfill_system_fields};
use crate::models::{Snapshot, Workspace};
use crate::persistence::PersistencePort;
use crate::util::timestamp_now;

#[derive(Debug, Clone, Copy)]
pub(super) enum Source {
    Load,
    Create,
}

impl<P: PersistencePort> SyncEngine<P> {
    /// Replace rows, schema and workspace with `snapshot` in one step.
    ///
    /// The replacement goes through the scheduler in suspended mode, so it is
    /// not treated as an edit. Dirty and any open conflict are cleared and the
    /// snapshot becomes both the pending payload and the durable baseline.
    pub fn apply_snapshot(&self, snapshot: Snapshot) {
        let Snapshot {
            data,
            schema,
            workspace,
        } = snapshot;
        let document = Arc::new(Document::new(data, schema));

        self.inner.update(|state| {
            if state.workspace.as_ref() != Some(&workspace) {
                state.last_saved = None;
            }
            state.workspace = Some(workspace);
            state.epoch += 1;
            state.conflict = None;
            state.conflict_fetching = false;
            state.save_requested = false;
            state.last_error = None;
            state.baseline = Some(Arc::clone(&document));
            self.record_mutation(state, document, AutosaveMode::Suspended);
            state.dirty = false;
        });
    }

    /// Flush and close the current workspace.
    ///
    /// If the flush fails the workspace stays open with its unsaved edits.
    pub async fn close_workspace(&self) -> Result<()> {
        let previous = self.unsubscribe();
        if let Err(error) = self.flush().await {
            self.resubscribe(previous.as_ref());
            return Err(error);
        }

        if let Some(workspace) = previous {
            tracing::info!("Closed {}", workspace.data_path.display());
        }
        self.inner.update(|state| state.reset());
        Ok(())
    }

    pub(super) async fn switch_workspace(
        &self,
        data_path: &Path,
        source: Source,
    ) -> Result<Workspace> {
        let previous = self.unsubscribe();
        if let Err(error) = self.flush().await {
            tracing::warn!("Keeping current table open, flush failed: {error}");
            self.resubscribe(previous.as_ref());
            return Err(error);
        }

        let loaded = match source {
            Source::Load => self.inner.port.load(data_path).await,
            Source::Create => self.inner.port.create(data_path).await,
        };
        let snapshot = match loaded {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!("Could not open {}: {error}", data_path.display());
                self.inner
                    .update(|state| state.last_error = Some(error.to_string()));
                self.resubscribe(previous.as_ref());
                return Err(error);
            }
        };

        let workspace = snapshot.workspace.clone();
        let (rows, ids_repaired) = backfill_system_fields(&snapshot.data, &timestamp_now());
        let (rows, cells_repaired) = backfill_rows(&snapshot.schema, &rows);
        let schema = snapshot.schema.clone();
        self.apply_snapshot(snapshot);

        match source {
            Source::Load => tracing::info!("Opened {}", workspace.data_path.display()),
            Source::Create => tracing::info!("Created {}", workspace.data_path.display()),
        }

        if let Err(error) = self.subscribe(&workspace) {
            tracing::warn!(
                "Not watching {} for changes: {error}",
                workspace.data_path.display()
            );
            self.inner
                .update(|state| state.last_error = Some(error.to_string()));
        }

        if ids_repaired || cells_repaired {
            tracing::info!("Repaired rows in {}", workspace.data_path.display());
            self.notify_mutation(rows, schema, AutosaveMode::Active)?;
        }

        Ok(workspace)
    }

    /// Forward change notifications for `workspace` to the conflict detector.
    fn subscribe(&self, workspace: &Workspace) -> Result<()> {
        let mut changes = self.inner.port.subscribe(workspace)?;
        let engine = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            while let Some(notification) = changes.recv().await {
                let Some(inner) = engine.upgrade() else {
                    break;
                };
                let engine = SyncEngine { inner };
                if let Err(error) = engine.handle_external_change(notification).await {
                    tracing::warn!("Could not check external change: {error}");
                }
            }
        });

        self.inner.update(|state| {
            state.stop_subscription();
            state.subscription = Some(handle);
        });
        Ok(())
    }

    /// Stop forwarding notifications. Returns the workspace that was open.
    fn unsubscribe(&self) -> Option<Workspace> {
        self.inner.update(|state| {
            if state.stop_subscription() {
                tracing::debug!("Unsubscribed from workspace changes");
            }
            state.workspace.clone()
        })
    }

    fn resubscribe(&self, workspace: Option<&Workspace>) {
        let Some(workspace) = workspace else {
            return;
        };
        if let Err(error) = self.subscribe(workspace) {
            tracing::warn!(
                "Not watching {} for changes: {error}",
                workspace.data_path.display()
            );
        }
    }
}
