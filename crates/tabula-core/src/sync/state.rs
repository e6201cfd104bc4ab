//! Mutable engine state guarded by the engine lock.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::conflict::ConflictState;
use crate::models::{Row, TableSchema, Workspace};
use crate::persistence::SaveReceipt;

/// Rows plus schema, shared between the document, the pending payload and the baseline
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub rows: Vec<Row>,
    pub schema: TableSchema,
}

impl Document {
    #[must_use]
    pub const fn new(rows: Vec<Row>, schema: TableSchema) -> Self {
        Self { rows, schema }
    }

    /// Same rows and columns, ignoring schema metadata.
    #[must_use]
    pub fn same_content(&self, rows: &[Row], schema: &TableSchema) -> bool {
        self.rows == rows && self.schema.same_columns(schema)
    }
}

#[derive(Debug)]
pub(super) struct DebounceTimer {
    pub generation: u64,
    pub handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub(super) struct EngineState {
    pub workspace: Option<Workspace>,
    pub document: Option<Arc<Document>>,
    pub pending: Option<Arc<Document>>,
    /// Last content known to be durable: the applied snapshot or the last write.
    pub baseline: Option<Arc<Document>>,
    pub dirty: bool,
    /// Bumped by every mutation; a save only clears dirty if it is unchanged.
    pub revision: u64,
    /// Bumped by every snapshot application.
    pub epoch: u64,
    pub saving: bool,
    pub save_requested: bool,
    pub ignore_until: Option<Instant>,
    pub conflict: Option<ConflictState>,
    pub conflict_fetching: bool,
    pub timer: Option<DebounceTimer>,
    pub timer_generation: u64,
    pub subscription: Option<JoinHandle<()>>,
    pub last_error: Option<String>,
    pub last_saved: Option<SaveReceipt>,
}

impl EngineState {
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    /// Claim the timer for the task that owns `generation`.
    ///
    /// Returns false when the timer was restarted or cancelled meanwhile.
    pub fn claim_timer(&mut self, generation: u64) -> bool {
        if self
            .timer
            .as_ref()
            .is_some_and(|timer| timer.generation == generation)
        {
            self.timer = None;
            return true;
        }
        false
    }

    pub fn stop_subscription(&mut self) -> bool {
        self.subscription.take().is_some_and(|handle| {
            handle.abort();
            true
        })
    }

    /// Stop background work and forget the workspace.
    pub fn reset(&mut self) {
        self.cancel_timer();
        self.stop_subscription();
        let epoch = self.epoch + 1;
        *self = Self::default();
        self.epoch = epoch;
    }

    /// Whether `rows`/`schema` match what is known to be on disk or already shown.
    pub fn already_known(&self, rows: &[Row], schema: &TableSchema) -> bool {
        [&self.baseline, &self.document]
            .into_iter()
            .flatten()
            .any(|document| document.same_content(rows, schema))
    }
}
