//! JSON workspace on disk.
//!
//! A table is a pair of files: `<stem>.json` holding an array of row objects
//! and `<stem>.schema.json` holding the schema. Writes go through a backup
//! copy and a temp file that is renamed over the target.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{ChangeNotification, ChangeStream, PersistencePort, SaveReceipt, CHANGE_BUFFER};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::factory::backfill_system_fields;
use crate::models::{normalize_data_path, Row, Snapshot, TableSchema, Workspace};
use crate::util::timestamp_now;

/// Persistence port backed by JSON files
#[derive(Debug, Clone)]
pub struct FileStore {
    poll_interval: Duration,
}

impl Default for FileStore {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl FileStore {
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.poll_interval())
    }
}

impl PersistencePort for FileStore {
    async fn load(&self, data_path: &Path) -> Result<Snapshot> {
        let data_path = data_path.to_path_buf();
        blocking(move || load_table(&data_path)).await
    }

    async fn create(&self, data_path: &Path) -> Result<Snapshot> {
        let data_path = data_path.to_path_buf();
        blocking(move || create_table(&data_path)).await
    }

    async fn save(
        &self,
        workspace: &Workspace,
        rows: &[Row],
        schema: &TableSchema,
    ) -> Result<SaveReceipt> {
        let workspace = workspace.clone();
        let rows = rows.to_vec();
        let schema = schema.clone();
        blocking(move || save_table(&workspace, &rows, schema)).await
    }

    async fn fetch_current(&self, workspace: &Workspace) -> Result<Snapshot> {
        let data_path = workspace.data_path.clone();
        blocking(move || load_table(&data_path)).await
    }

    fn subscribe(&self, workspace: &Workspace) -> Result<ChangeStream> {
        let (sender, receiver) = mpsc::channel(CHANGE_BUFFER);
        let notification = ChangeNotification::for_workspace(workspace);
        let watched_names = [&workspace.data_path, &workspace.schema_path]
            .into_iter()
            .filter_map(|path| path.file_name().map(OsStr::to_os_string))
            .collect::<Vec<_>>();

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let event = match event {
                Ok(event) => event,
                Err(error) => {
                    tracing::warn!("File watcher error: {error}");
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
            ) {
                return;
            }
            let relevant = event.paths.iter().any(|path| {
                path.file_name()
                    .is_some_and(|name| watched_names.iter().any(|watched| watched == name))
            });
            if !relevant {
                return;
            }

            tracing::debug!(
                "Workspace files changed on disk: {}",
                notification.data_path.display()
            );
            match sender.try_send(notification.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Change stream closed, dropping notification");
                }
            }
        })
        .map_err(watch_error)?;

        watcher
            .configure(
                Config::default()
                    .with_compare_contents(true)
                    .with_poll_interval(self.poll_interval),
            )
            .map_err(watch_error)?;

        // The folder is watched rather than the files, since saves replace them by rename.
        let folder = if workspace.folder.as_os_str().is_empty() {
            Path::new(".")
        } else {
            workspace.folder.as_path()
        };
        watcher
            .watch(folder, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        Ok(ChangeStream::watched(receiver, watcher))
    }
}

fn watch_error(error: notify::Error) -> Error {
    Error::Io(std::io::Error::other(format!("file watcher: {error}")))
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| Error::Io(std::io::Error::other(error.to_string())))?
}

fn load_table(data_path: &Path) -> Result<Snapshot> {
    if !data_path.exists() {
        return Err(Error::Load(format!(
            "data file does not exist: {}",
            data_path.display()
        )));
    }

    let workspace = Workspace::for_data_path(data_path)?;
    if !workspace.schema_path.exists() {
        tracing::info!(
            "Schema file missing, writing default schema to {}",
            workspace.schema_path.display()
        );
        let schema = TableSchema::initial(&workspace.table_name(), &timestamp_now());
        write_json(&workspace.schema_path, &schema).map_err(|error| {
            Error::Load(format!(
                "failed to write default schema {}: {error}",
                workspace.schema_path.display()
            ))
        })?;
    }

    let rows = read_data_file(&workspace.data_path)?;
    let schema = read_schema_file(&workspace.schema_path)?;
    Ok(Snapshot::new(rows, schema, workspace))
}

fn create_table(raw_path: &Path) -> Result<Snapshot> {
    let data_path = normalize_data_path(raw_path)?;
    let workspace =
        Workspace::for_data_path(&data_path).map_err(|error| Error::Create(error.to_string()))?;

    if let Some(parent) = data_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| {
            Error::Create(format!("failed to create {}: {error}", parent.display()))
        })?;
    }

    if workspace.data_path.exists() || workspace.schema_path.exists() {
        return Err(Error::Create(format!(
            "a table named '{}' already exists in {}",
            workspace.table_name(),
            workspace.folder.display()
        )));
    }

    let schema = TableSchema::initial(&workspace.table_name(), &timestamp_now());
    let rows: Vec<Row> = Vec::new();
    write_json(&workspace.data_path, &rows)
        .and_then(|()| write_json(&workspace.schema_path, &schema))
        .map_err(|error| Error::Create(error.to_string()))?;

    tracing::info!("Created table at {}", workspace.data_path.display());
    Ok(Snapshot::new(rows, schema, workspace))
}

fn save_table(
    workspace: &Workspace,
    rows: &[Row],
    mut schema: TableSchema,
) -> Result<SaveReceipt> {
    let updated_at = timestamp_now();
    let (rows, _) = backfill_system_fields(rows, &updated_at);
    let row_count = rows.len();
    schema.stamp_metadata(row_count, &updated_at);

    write_json(&workspace.data_path, &rows).map_err(|error| {
        Error::Save(format!("{}: {error}", workspace.data_path.display()))
    })?;
    write_json(&workspace.schema_path, &schema).map_err(|error| {
        Error::Save(format!("{}: {error}", workspace.schema_path.display()))
    })?;

    Ok(SaveReceipt {
        row_count,
        updated_at,
    })
}

fn read_data_file(path: &Path) -> Result<Vec<Row>> {
    let contents = fs::read_to_string(path)
        .map_err(|error| Error::Load(format!("failed to read {}: {error}", path.display())))?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|error| Error::Load(format!("{} is not valid JSON: {error}", path.display())))?;

    let Value::Array(items) = value else {
        return Err(Error::Load(format!(
            "{} must contain a JSON array of rows",
            path.display()
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(Row::from_map(fields)),
            _ => Err(Error::Load(format!(
                "row {index} in {} is not an object",
                path.display()
            ))),
        })
        .collect()
}

fn read_schema_file(path: &Path) -> Result<TableSchema> {
    let contents = fs::read_to_string(path)
        .map_err(|error| Error::Load(format!("failed to read {}: {error}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|error| Error::Load(format!("invalid schema in {}: {error}", path.display())))
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)?;
    write_with_backup(path, contents.as_bytes())?;
    Ok(())
}

/// Copy the current file to `*.bak`, write a temp file, rename it into place.
fn write_with_backup(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    if path.exists() {
        fs::copy(path, path.with_extension("json.bak"))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let mut file = File::create(&tmp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ORDER_FIELD;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> FileStore {
        FileStore::new(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn create_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();

        let created = store.create(&dir.path().join("tasks")).await.unwrap();
        assert_eq!(created.workspace.data_path, dir.path().join("tasks.json"));
        assert!(created.workspace.schema_path.exists());
        assert!(created.data.is_empty());

        let loaded = store.load(&created.workspace.data_path).await.unwrap();
        assert_eq!(loaded.workspace, created.workspace);
        assert_eq!(loaded.schema.column_ids(), created.schema.column_ids());
        assert_eq!(loaded.schema.name.as_deref(), Some("tasks"));
    }

    #[tokio::test]
    async fn create_rejects_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        store.create(&dir.path().join("tasks.json")).await.unwrap();

        let error = store
            .create(&dir.path().join("tasks.json"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Create(_)));
    }

    #[tokio::test]
    async fn load_missing_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = store()
            .load(&dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Load(_)));
    }

    #[tokio::test]
    async fn load_writes_missing_schema() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("imported.json");
        fs::write(&data_path, r#"[{"_id": "row_a", "title": "hello"}]"#).unwrap();

        let snapshot = store().load(&data_path).await.unwrap();
        assert!(dir.path().join("imported.schema.json").exists());
        assert_eq!(snapshot.data.len(), 1);
        assert_eq!(snapshot.data[0].get("title"), Some(&json!("hello")));
    }

    #[tokio::test]
    async fn load_rejects_non_array_data() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("broken.json");
        fs::write(&data_path, r#"{"rows": []}"#).unwrap();

        let error = store().load(&data_path).await.unwrap_err();
        assert!(error.to_string().contains("JSON array"));
    }

    #[tokio::test]
    async fn save_normalises_rows_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let snapshot = store.create(&dir.path().join("tasks")).await.unwrap();

        let mut row = Row::new();
        row.insert("title", json!("write tests"));
        row.insert(ORDER_FIELD, json!("first"));

        let receipt = store
            .save(&snapshot.workspace, &[row], &snapshot.schema)
            .await
            .unwrap();
        assert_eq!(receipt.row_count, 1);

        let reloaded = store.load(&snapshot.workspace.data_path).await.unwrap();
        let saved = &reloaded.data[0];
        assert!(saved.id().is_some_and(|id| id.starts_with("row_")));
        assert_eq!(saved.order(), Some(0));
        assert_eq!(saved.created(), Some(receipt.updated_at.as_str()));
        assert_eq!(
            reloaded.schema.metadata.as_ref().unwrap()["row_count"],
            json!(1)
        );
        assert!(dir.path().join("tasks.json.bak").exists());
        assert!(!dir.path().join("tasks.json.tmp").exists());
    }

    #[tokio::test]
    async fn save_preserves_unknown_schema_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let snapshot = store.create(&dir.path().join("tasks")).await.unwrap();

        let mut schema = snapshot.schema.clone();
        schema.extra.insert("views".into(), json!([{"kind": "grid"}]));
        store.save(&snapshot.workspace, &[], &schema).await.unwrap();

        let reloaded = store.load(&snapshot.workspace.data_path).await.unwrap();
        assert_eq!(reloaded.schema.extra.get("views"), Some(&json!([{"kind": "grid"}])));
    }

    #[tokio::test]
    async fn subscribe_reports_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let snapshot = store.create(&dir.path().join("tasks")).await.unwrap();
        let mut changes = store.subscribe(&snapshot.workspace).unwrap();

        fs::write(&snapshot.workspace.data_path, r#"[{"_id": "row_x"}]"#).unwrap();

        let notification = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("change should be reported")
            .unwrap();
        assert!(notification.concerns(&snapshot.workspace));
    }
}
