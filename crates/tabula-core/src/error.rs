//! Error types for tabula-core

use thiserror::Error;

/// Result type alias using tabula-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tabula-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Table files are missing, corrupt, or unparseable
    #[error("Failed to load table: {0}")]
    Load(String),

    /// Target path already holds a table, or the initial write failed
    #[error("Failed to create table: {0}")]
    Create(String),

    /// Writing the table failed
    #[error("Failed to save table: {0}")]
    Save(String),

    /// Attempt to delete or rename a system column
    #[error("Column '{0}' is a system column and cannot be modified")]
    ProtectedColumn(String),

    /// Invalid input for a table edit
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation requires an open workspace
    #[error("No workspace is open")]
    NoWorkspace,

    /// Conflict resolution requested with no conflict open
    #[error("No conflict to resolve")]
    NoConflict,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
