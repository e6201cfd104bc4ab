use std::path::Path;

use tabula_core::models::normalize_data_path;
use tabula_core::{EngineConfig, Error, FileStore, PersistencePort, Workspace};

use crate::commands::common::format_table_lines;
use crate::error::CliError;

/// Print a table without opening it for editing.
///
/// Nothing is written: a table whose schema file is missing is rejected, since
/// loading it would create the default schema.
pub async fn run_show(path: &Path, as_json: bool, config: &EngineConfig) -> Result<(), CliError> {
    let workspace = Workspace::for_data_path(normalize_data_path(path)?)?;
    if !workspace.schema_path.exists() {
        return Err(Error::Load(format!(
            "schema file {} is missing; open the table with an editing command to create it",
            workspace.schema_path.display()
        ))
        .into());
    }

    let snapshot = FileStore::from_config(config)
        .load(&workspace.data_path)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for line in format_table_lines(&snapshot.schema, &snapshot.data) {
            println!("{line}");
        }
    }

    Ok(())
}
