use std::path::Path;

use tabula_core::EngineConfig;

use crate::commands::common::file_engine;
use crate::error::CliError;

pub async fn run_create(path: &Path, config: &EngineConfig) -> Result<(), CliError> {
    let engine = file_engine(config);
    let workspace = engine.create_workspace(path).await?;
    engine.close_workspace().await?;

    println!("{}", workspace.data_path.display());
    Ok(())
}
