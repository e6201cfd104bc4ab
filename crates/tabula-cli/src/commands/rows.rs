use std::path::Path;

use serde_json::Value;
use tabula_core::factory::{append_row, remove_row, reorder_rows, update_cell};
use tabula_core::EngineConfig;

use crate::commands::common::{edit_table, require_row};
use crate::error::CliError;

pub async fn run_add_row(path: &Path, config: &EngineConfig) -> Result<(), CliError> {
    let snapshot = edit_table(path, config, |document| {
        Ok((
            document.schema.clone(),
            append_row(&document.schema, &document.rows),
        ))
    })
    .await?;

    if let Some(row_id) = snapshot.data.last().and_then(|row| row.id()) {
        println!("{row_id}");
    }
    Ok(())
}

pub async fn run_remove_row(
    path: &Path,
    row_id: &str,
    config: &EngineConfig,
) -> Result<(), CliError> {
    edit_table(path, config, |document| {
        require_row(&document.rows, row_id)?;
        Ok((
            document.schema.clone(),
            remove_row(&document.rows, row_id),
        ))
    })
    .await?;

    println!("Removed row {row_id}");
    Ok(())
}

pub async fn run_set_cell(
    path: &Path,
    row_id: &str,
    column_id: &str,
    value: &str,
    config: &EngineConfig,
) -> Result<(), CliError> {
    edit_table(path, config, |document| {
        let rows = update_cell(
            &document.schema,
            &document.rows,
            row_id,
            column_id,
            &Value::String(value.to_string()),
        )?;
        Ok((document.schema.clone(), rows))
    })
    .await?;

    Ok(())
}

pub async fn run_move_row(
    path: &Path,
    from_id: &str,
    to_id: &str,
    config: &EngineConfig,
) -> Result<(), CliError> {
    edit_table(path, config, |document| {
        require_row(&document.rows, from_id)?;
        require_row(&document.rows, to_id)?;
        Ok((
            document.schema.clone(),
            reorder_rows(&document.rows, from_id, to_id),
        ))
    })
    .await?;

    Ok(())
}
