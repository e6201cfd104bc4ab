use std::path::Path;

use tabula_core::factory::{add_column, remove_column, rename_column, reorder_columns};
use tabula_core::{ColumnType, EngineConfig};

use crate::commands::common::{edit_table, require_column};
use crate::error::CliError;

pub async fn run_add_column(
    path: &Path,
    name: &str,
    column_type: &str,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let column_type = column_type.parse::<ColumnType>()?;
    let snapshot = edit_table(path, config, |document| {
        Ok(add_column(
            &document.schema,
            &document.rows,
            name,
            column_type,
        )?)
    })
    .await?;

    if let Some(column) = snapshot.schema.columns.last() {
        println!("{}", column.id);
    }
    Ok(())
}

pub async fn run_remove_column(
    path: &Path,
    column_id: &str,
    config: &EngineConfig,
) -> Result<(), CliError> {
    edit_table(path, config, |document| {
        require_column(&document.schema, column_id)?;
        Ok(remove_column(&document.schema, &document.rows, column_id)?)
    })
    .await?;

    println!("Removed column {column_id}");
    Ok(())
}

pub async fn run_rename_column(
    path: &Path,
    column_id: &str,
    name: &str,
    config: &EngineConfig,
) -> Result<(), CliError> {
    edit_table(path, config, |document| {
        let schema = rename_column(&document.schema, column_id, name)?;
        Ok((schema, document.rows.clone()))
    })
    .await?;

    println!("Renamed column {column_id}");
    Ok(())
}

pub async fn run_move_column(
    path: &Path,
    from_id: &str,
    to_id: &str,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let snapshot = edit_table(path, config, |document| {
        require_column(&document.schema, from_id)?;
        require_column(&document.schema, to_id)?;
        let schema = reorder_columns(&document.schema, from_id, to_id);
        Ok((schema, document.rows.clone()))
    })
    .await?;

    println!("{}", snapshot.schema.column_ids().join(", "));
    Ok(())
}
