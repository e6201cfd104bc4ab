//! Workspace and snapshot models

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::row::Row;
use super::schema::TableSchema;
use crate::error::{Error, Result};

const DATA_EXTENSION: &str = "json";
const SCHEMA_SUFFIX: &str = "schema.json";

/// The data/schema file pair a table document is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Workspace {
    pub data_path: PathBuf,
    pub schema_path: PathBuf,
    pub folder: PathBuf,
}

impl Workspace {
    /// Derive the workspace for a data file (`tasks.json` → `tasks.schema.json`).
    pub fn for_data_path(data_path: impl Into<PathBuf>) -> Result<Self> {
        let data_path = data_path.into();
        let schema_path = schema_path_for(&data_path)?;
        let folder = data_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self {
            data_path,
            schema_path,
            folder,
        })
    }

    /// Table name derived from the data file stem.
    #[must_use]
    pub fn table_name(&self) -> String {
        self.data_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("Untitled")
            .to_string()
    }

    /// Whether a path refers to one of this workspace's files.
    #[must_use]
    pub fn owns_path(&self, path: &Path) -> bool {
        path == self.data_path || path == self.schema_path
    }
}

/// Schema path that belongs to a data file.
pub fn schema_path_for(data_path: &Path) -> Result<PathBuf> {
    let stem = data_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::trim)
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| {
            Error::Load(format!(
                "cannot derive a table name from {}",
                data_path.display()
            ))
        })?;

    let parent = data_path.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(format!("{stem}.{SCHEMA_SUFFIX}")))
}

/// Normalise a user-entered path for a new table: trims it and forces `.json`.
pub fn normalize_data_path(raw: &Path) -> Result<PathBuf> {
    let trimmed = raw.to_string_lossy().trim().to_string();
    if trimmed.is_empty() {
        return Err(Error::Create("a file path is required".to_string()));
    }

    let mut data_path = PathBuf::from(trimmed);
    if data_path.extension().and_then(|ext| ext.to_str()) != Some(DATA_EXTENSION) {
        data_path.set_extension(DATA_EXTENSION);
    }

    let has_stem = data_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| !stem.trim().is_empty());
    if !has_stem {
        return Err(Error::Create("a file name is required".to_string()));
    }

    Ok(data_path)
}

/// Atomic (rows, schema, workspace) triple exchanged with the persistence port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: Vec<Row>,
    pub schema: TableSchema,
    pub workspace: Workspace,
}

impl Snapshot {
    #[must_use]
    pub const fn new(data: Vec<Row>, schema: TableSchema, workspace: Workspace) -> Self {
        Self {
            data,
            schema,
            workspace,
        }
    }

    /// Whether rows and columns match, ignoring schema metadata bags.
    #[must_use]
    pub fn same_content(&self, rows: &[Row], schema: &TableSchema) -> bool {
        self.data == rows && self.schema.same_columns(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_path_for() {
        let path = schema_path_for(Path::new("/data/tasks.json")).unwrap();
        assert_eq!(path, PathBuf::from("/data/tasks.schema.json"));
    }

    #[test]
    fn test_workspace_for_data_path() {
        let workspace = Workspace::for_data_path("/data/tasks.json").unwrap();
        assert_eq!(workspace.folder, PathBuf::from("/data"));
        assert_eq!(workspace.table_name(), "tasks");
        assert!(workspace.owns_path(Path::new("/data/tasks.schema.json")));
        assert!(!workspace.owns_path(Path::new("/data/other.json")));
    }

    #[test]
    fn test_normalize_data_path() {
        assert_eq!(
            normalize_data_path(Path::new("  /data/tasks ")).unwrap(),
            PathBuf::from("/data/tasks.json")
        );
        assert_eq!(
            normalize_data_path(Path::new("/data/tasks.json")).unwrap(),
            PathBuf::from("/data/tasks.json")
        );
        assert!(normalize_data_path(Path::new("   ")).is_err());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let workspace = Workspace::for_data_path("/data/tasks.json").unwrap();
        let snapshot = Snapshot::new(Vec::new(), TableSchema::default(), workspace);
        let encoded = serde_json::to_value(&snapshot).unwrap();
        assert!(encoded["data"].is_array());
        assert!(encoded["schema"]["columns"].is_array());
        assert_eq!(encoded["workspace"]["schema_path"], "/data/tasks.schema.json");
    }
}
