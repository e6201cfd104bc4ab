//! tabula-core - Core library for Tabula
//!
//! This crate contains the table document model, the pure column/row edit
//! functions, the persistence port with its file and in-memory adapters, and
//! the sync engine that autosaves a table and detects external changes to it.

pub mod config;
pub mod error;
pub mod factory;
pub mod models;
pub mod persistence;
pub mod sync;
pub mod util;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use models::{ColumnDefinition, ColumnType, Row, Snapshot, TableSchema, Workspace};
pub use persistence::{FileStore, MemoryStore, PersistencePort};
pub use sync::{AutosaveMode, ConflictCheck, SaveOutcome, SyncEngine, SyncStatus};
