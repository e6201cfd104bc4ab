//! Tabula CLI - edit JSON tables from the terminal
//!
//! Every edit goes through the sync engine: open the table, apply the change,
//! flush, close. `watch` keeps a table open and reports outside changes.

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::columns::{
    run_add_column, run_move_column, run_remove_column, run_rename_column,
};
use crate::commands::completions::run_completions;
use crate::commands::create::run_create;
use crate::commands::rows::{run_add_row, run_move_row, run_remove_row, run_set_cell};
use crate::commands::show::run_show;
use crate::commands::watch::run_watch;
use crate::config::load_engine_config;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tabula=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = load_engine_config(cli.config.as_deref()).map_err(CliError::Config)?;

    match cli.command {
        Commands::Create { path } => run_create(&path, &config).await?,
        Commands::Show { path, json } => run_show(&path, json, &config).await?,
        Commands::AddColumn {
            path,
            name,
            column_type,
        } => run_add_column(&path, &name, &column_type, &config).await?,
        Commands::RemoveColumn { path, id } => run_remove_column(&path, &id, &config).await?,
        Commands::RenameColumn { path, id, name } => {
            run_rename_column(&path, &id, &name, &config).await?;
        }
        Commands::MoveColumn { path, from, to } => {
            run_move_column(&path, &from, &to, &config).await?;
        }
        Commands::AddRow { path } => run_add_row(&path, &config).await?,
        Commands::RemoveRow { path, row_id } => run_remove_row(&path, &row_id, &config).await?,
        Commands::Set {
            path,
            row_id,
            column,
            value,
        } => run_set_cell(&path, &row_id, &column, &value, &config).await?,
        Commands::MoveRow { path, from, to } => run_move_row(&path, &from, &to, &config).await?,
        Commands::Watch { path, on_conflict } => run_watch(&path, on_conflict, &config).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
