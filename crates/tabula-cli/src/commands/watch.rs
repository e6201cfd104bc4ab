use std::path::Path;

use tabula_core::{EngineConfig, SyncStatus};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};

use crate::cli::ConflictPolicy;
use crate::commands::common::{open_table, FileEngine};
use crate::error::CliError;

/// Keep a table open, print status changes, and resolve conflicts until Ctrl-C.
pub async fn run_watch(
    path: &Path,
    policy: ConflictPolicy,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let engine = open_table(path, config).await?;
    let mut status = engine.subscribe_status();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("Watching {} (Ctrl-C to stop)", path.display());
    let mut last_message = print_status(&status.borrow_and_update(), None);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                last_message = print_status(&current, last_message.as_deref());
                if current.conflict {
                    try_resolve_conflict(&engine, policy, &mut input).await;
                }
            }
        }
    }

    engine.close_workspace().await?;
    println!("Stopped watching {}", path.display());
    Ok(())
}

fn print_status(status: &SyncStatus, previous: Option<&str>) -> Option<String> {
    if previous != Some(status.message.as_str()) {
        println!("{}", status.message);
    }
    Some(status.message.clone())
}

/// Resolve an open conflict, reporting failures instead of ending the watch.
///
/// Returns false when resolving failed.
pub async fn try_resolve_conflict<R>(
    engine: &FileEngine,
    policy: ConflictPolicy,
    input: &mut Lines<R>,
) -> bool
where
    R: AsyncBufRead + Unpin,
{
    match resolve_conflict(engine, policy, input).await {
        Ok(()) => true,
        Err(error) => {
            eprintln!("Error: {error}");
            false
        }
    }
}

async fn resolve_conflict<R>(
    engine: &FileEngine,
    policy: ConflictPolicy,
    input: &mut Lines<R>,
) -> Result<(), CliError>
where
    R: AsyncBufRead + Unpin,
{
    let choice = match policy {
        ConflictPolicy::Ask => prompt_choice(input).await?,
        other => other,
    };

    match choice {
        ConflictPolicy::KeepLocal => {
            engine.resolve_keep_local().await?;
            println!("Kept local version");
        }
        ConflictPolicy::ReloadExternal => {
            engine.resolve_reload_external().await?;
            println!("Reloaded outside version");
        }
        ConflictPolicy::Ask => {}
    }
    Ok(())
}

async fn prompt_choice<R>(input: &mut Lines<R>) -> Result<ConflictPolicy, CliError>
where
    R: AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    loop {
        stdout
            .write_all(b"[k]eep local or [r]eload external? ")
            .await?;
        stdout.flush().await?;

        let Some(line) = input.next_line().await? else {
            println!();
            println!("No answer on stdin, conflict left open");
            return Ok(ConflictPolicy::Ask);
        };
        if let Some(choice) = parse_conflict_choice(&line) {
            return Ok(choice);
        }
    }
}

pub fn parse_conflict_choice(answer: &str) -> Option<ConflictPolicy> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "k" | "keep" | "keep-local" | "local" => Some(ConflictPolicy::KeepLocal),
        "r" | "reload" | "reload-external" | "external" => Some(ConflictPolicy::ReloadExternal),
        _ => None,
    }
}
