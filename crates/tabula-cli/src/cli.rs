use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Edit JSON tables from the command line and watch them for outside changes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to an engine config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new, empty table
    #[command(alias = "new")]
    Create {
        /// Data file path (`.json` is appended when missing)
        path: PathBuf,
    },
    /// Print a table
    Show {
        /// Data file path
        path: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Append a column
    AddColumn {
        /// Data file path
        path: PathBuf,
        /// Display name; the column id is derived from it
        name: String,
        /// Column type (text, number, checkbox)
        #[arg(long = "type", default_value = "text")]
        column_type: String,
    },
    /// Remove a column and its values
    RemoveColumn {
        /// Data file path
        path: PathBuf,
        /// Column id
        id: String,
    },
    /// Change a column's display name
    RenameColumn {
        /// Data file path
        path: PathBuf,
        /// Column id
        id: String,
        /// New display name
        name: String,
    },
    /// Move a column to another column's position
    MoveColumn {
        /// Data file path
        path: PathBuf,
        /// Column id to move
        from: String,
        /// Column id whose position it takes
        to: String,
    },
    /// Append an empty row
    AddRow {
        /// Data file path
        path: PathBuf,
    },
    /// Remove a row
    RemoveRow {
        /// Data file path
        path: PathBuf,
        /// Row id
        row_id: String,
    },
    /// Set one cell
    Set {
        /// Data file path
        path: PathBuf,
        /// Row id
        row_id: String,
        /// Column id
        column: String,
        /// New value, converted to the column's type
        value: String,
    },
    /// Move a row to another row's position
    MoveRow {
        /// Data file path
        path: PathBuf,
        /// Row id to move
        from: String,
        /// Row id whose position it takes
        to: String,
    },
    /// Keep a table open and report saves and outside changes until Ctrl-C
    Watch {
        /// Data file path
        path: PathBuf,
        /// How to resolve a conflict with an outside change
        #[arg(long, value_enum, default_value_t = ConflictPolicy::Ask)]
        on_conflict: ConflictPolicy,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConflictPolicy {
    /// Prompt on stdin
    Ask,
    /// Overwrite the outside change with the open table
    KeepLocal,
    /// Discard the open table and load the outside change
    ReloadExternal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
