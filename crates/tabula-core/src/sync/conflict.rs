//! Conflict detection and resolution.
//!
//! A change notification that passes the gates (open workspace, related path,
//! outside the suppression window, no conflict already open) triggers a fetch
//! of the current snapshot. If the fetched content is neither the last durable
//! content nor what is already shown, a conflict opens and stays open until the
//! caller keeps the local document or reloads the external one.

use tokio::time::Instant;

use super::executor::SaveOutcome;
use super::SyncEngine;
use crate::error::{Error, Result};
use crate::models::Snapshot;
use crate::persistence::{ChangeNotification, PersistencePort};
use crate::util::timestamp_now;

/// An external change waiting for the user's decision
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictState {
    /// Snapshot fetched when the change was detected.
    pub remote: Snapshot,
    pub detected_at: Instant,
    /// Wall-clock detection time for display.
    pub detected_timestamp: String,
}

/// Why a change notification did not open a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoWorkspace,
    UnrelatedPath,
    /// Inside the window after one of our own saves.
    Suppressed,
    /// A conflict is already open or being checked.
    AlreadyOpen,
    /// The fetched content matches what we already have.
    Unchanged,
    /// The workspace was replaced while fetching.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCheck {
    Opened,
    Ignored(IgnoreReason),
}

/// Clears the fetching flag if the check is dropped mid-fetch.
struct FetchGuard<'a, P: PersistencePort> {
    engine: &'a SyncEngine<P>,
    epoch: u64,
    finished: bool,
}

impl<P: PersistencePort> Drop for FetchGuard<'_, P> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let epoch = self.epoch;
        self.engine.inner.update(|state| {
            if state.epoch == epoch {
                state.conflict_fetching = false;
            }
        });
    }
}

impl<P: PersistencePort> SyncEngine<P> {
    /// Decide whether a change notification is a genuine external edit.
    ///
    /// Fetch failures are shown in the status and returned; the state stays clean.
    pub async fn handle_external_change(
        &self,
        notification: ChangeNotification,
    ) -> Result<ConflictCheck> {
        let now = self.inner.clock.now();
        let gate = self.inner.update(|state| {
            let Some(workspace) = state.workspace.clone() else {
                return Err(IgnoreReason::NoWorkspace);
            };
            if !notification.concerns(&workspace) {
                return Err(IgnoreReason::UnrelatedPath);
            }
            if state.ignore_until.is_some_and(|deadline| now < deadline) {
                return Err(IgnoreReason::Suppressed);
            }
            if state.conflict.is_some() || state.conflict_fetching {
                return Err(IgnoreReason::AlreadyOpen);
            }
            state.conflict_fetching = true;
            Ok((workspace, state.epoch))
        });

        let (workspace, epoch) = match gate {
            Ok(gate) => gate,
            Err(reason) => {
                tracing::debug!(
                    "Ignoring change to {}: {reason:?}",
                    notification.data_path.display()
                );
                return Ok(ConflictCheck::Ignored(reason));
            }
        };

        let mut guard = FetchGuard {
            engine: self,
            epoch,
            finished: false,
        };
        let fetched = self.inner.port.fetch_current(&workspace).await;
        guard.finished = true;

        self.inner.update(|state| {
            if state.epoch != epoch {
                return Ok(ConflictCheck::Ignored(IgnoreReason::Superseded));
            }
            state.conflict_fetching = false;

            let remote = match fetched {
                Ok(remote) => remote,
                Err(error) => {
                    state.last_error = Some(error.to_string());
                    return Err(error);
                }
            };

            if state.already_known(&remote.data, &remote.schema) {
                tracing::debug!(
                    "Change to {} matches known content",
                    workspace.data_path.display()
                );
                return Ok(ConflictCheck::Ignored(IgnoreReason::Unchanged));
            }

            tracing::warn!(
                "External change detected in {}",
                workspace.data_path.display()
            );
            state.conflict = Some(ConflictState {
                remote,
                detected_at: self.inner.clock.now(),
                detected_timestamp: timestamp_now(),
            });
            Ok(ConflictCheck::Opened)
        })
    }

    /// Resolve the open conflict by overwriting the external change with the
    /// local document.
    pub async fn resolve_keep_local(&self) -> Result<SaveOutcome> {
        let conflict = self
            .inner
            .update(|state| state.conflict.take())
            .ok_or(Error::NoConflict)?;
        tracing::info!(
            "Keeping local version of {}",
            conflict.remote.workspace.data_path.display()
        );
        self.save_now().await
    }

    /// Resolve the open conflict by replacing the local document with the
    /// captured external snapshot. Unsaved local edits are discarded.
    pub async fn resolve_reload_external(&self) -> Result<()> {
        self.wait_for_idle().await;
        let conflict = self
            .inner
            .update(|state| state.conflict.take())
            .ok_or(Error::NoConflict)?;
        tracing::info!(
            "Reloading {} from storage",
            conflict.remote.workspace.data_path.display()
        );
        self.apply_snapshot(conflict.remote);
        Ok(())
    }
}
