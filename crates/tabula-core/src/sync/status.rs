//! Status projection published to front-ends.

use serde::Serialize;

use super::state::EngineState;

/// Read model of the engine, recomputed after every state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub message: String,
    pub saving: bool,
    pub dirty: bool,
    pub error: Option<String>,
    pub conflict: bool,
    pub table_name: Option<String>,
    pub last_saved_at: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::project(&EngineState::default())
    }
}

impl SyncStatus {
    pub(super) fn project(state: &EngineState) -> Self {
        let table_name = state.workspace.as_ref().map(|workspace| workspace.table_name());
        let last_saved_at = state
            .last_saved
            .as_ref()
            .map(|receipt| receipt.updated_at.clone());

        let message = match (&table_name, &state.last_error, &state.last_saved) {
            (None, Some(error), _) => error.clone(),
            (None, None, _) => "No table open".to_string(),
            (Some(name), _, _) if state.conflict.is_some() => {
                format!("{name} was changed outside this session")
            }
            (Some(_), _, _) if state.saving => "Saving...".to_string(),
            (Some(_), Some(error), _) => error.clone(),
            (Some(_), None, _) if state.dirty => "Unsaved changes".to_string(),
            (Some(_), None, Some(receipt)) => format!(
                "Saved {} {} at {}",
                receipt.row_count,
                if receipt.row_count == 1 { "row" } else { "rows" },
                receipt.updated_at
            ),
            (Some(name), None, None) => format!("Opened {name}"),
        };

        Self {
            message,
            saving: state.saving,
            dirty: state.dirty,
            error: state.last_error.clone(),
            conflict: state.conflict.is_some(),
            table_name,
            last_saved_at,
        }
    }

    /// Whether nothing is waiting to be written.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !self.saving && !self.dirty
    }
}
