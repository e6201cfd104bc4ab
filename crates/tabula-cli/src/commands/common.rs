use std::path::Path;

use serde_json::Value;
use tabula_core::factory::validate_required;
use tabula_core::models::row_index;
use tabula_core::sync::Document;
use tabula_core::util::compact_text;
use tabula_core::{
    AutosaveMode, EngineConfig, FileStore, Row, Snapshot, SyncEngine, TableSchema,
};

use crate::error::CliError;

pub type FileEngine = SyncEngine<FileStore>;

pub fn file_engine(config: &EngineConfig) -> FileEngine {
    SyncEngine::new(FileStore::from_config(config), *config)
}

pub async fn open_table(path: &Path, config: &EngineConfig) -> Result<FileEngine, CliError> {
    let engine = file_engine(config);
    engine.open_workspace(path).await?;
    Ok(engine)
}

/// Open a table, apply one edit, and close it once the edit is written.
///
/// Returns the document as it was handed to the engine.
pub async fn edit_table<F>(
    path: &Path,
    config: &EngineConfig,
    edit: F,
) -> Result<Snapshot, CliError>
where
    F: FnOnce(&Document) -> Result<(TableSchema, Vec<Row>), CliError>,
{
    let engine = open_table(path, config).await?;
    let edited = apply_edit(&engine, edit);
    engine.close_workspace().await?;
    edited
}

fn apply_edit<F>(engine: &FileEngine, edit: F) -> Result<Snapshot, CliError>
where
    F: FnOnce(&Document) -> Result<(TableSchema, Vec<Row>), CliError>,
{
    let document = engine.document().ok_or(tabula_core::Error::NoWorkspace)?;
    let (schema, rows) = edit(&document)?;
    for issue in validate_required(&schema, &rows) {
        tracing::warn!("{issue}");
    }
    engine.notify_mutation(rows, schema, AutosaveMode::Active)?;
    engine
        .snapshot()
        .ok_or_else(|| tabula_core::Error::NoWorkspace.into())
}

pub fn require_row(rows: &[Row], row_id: &str) -> Result<(), CliError> {
    row_index(rows, row_id)
        .map(|_| ())
        .ok_or_else(|| CliError::RowNotFound(row_id.to_string()))
}

pub fn require_column(schema: &TableSchema, column_id: &str) -> Result<(), CliError> {
    schema
        .column(column_id)
        .map(|_| ())
        .ok_or_else(|| CliError::ColumnNotFound(column_id.to_string()))
}

pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => compact_text(text),
        Some(other) => other.to_string(),
    }
}

/// Render rows as aligned text: the row id, then every visible column.
pub fn format_table_lines(schema: &TableSchema, rows: &[Row]) -> Vec<String> {
    let columns = schema.visible_columns().collect::<Vec<_>>();

    let mut grid = Vec::with_capacity(rows.len() + 1);
    let mut header = vec!["id".to_string()];
    header.extend(columns.iter().map(|column| column.name.clone()));
    grid.push(header);

    for row in rows {
        let mut cells = vec![row.id().unwrap_or("-").to_string()];
        cells.extend(
            columns
                .iter()
                .map(|column| render_value(row.get(&column.id))),
        );
        grid.push(cells);
    }

    let widths = (0..=columns.len())
        .map(|index| {
            grid.iter()
                .map(|cells| cells[index].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect::<Vec<_>>();

    let mut lines = grid
        .iter()
        .map(|cells| {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>();

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join("  ");
    lines.insert(1, rule);

    if rows.is_empty() {
        lines.push("(no rows)".to_string());
    }
    lines
}
