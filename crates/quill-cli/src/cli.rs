use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Offline-first notes, synchronised through a plain directory")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Quick capture: quill "note title"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        title: Vec<String>,
        /// Note body (read from stdin when piped)
        #[arg(short, long)]
        body: Option<String>,
        /// Folder ID or unique ID prefix
        #[arg(short, long, value_name = "ID")]
        folder: Option<String>,
    },
    /// List notes
    List {
        /// Only notes in this folder (ID or unique ID prefix)
        #[arg(short, long, value_name = "ID")]
        folder: Option<String>,
        /// Only conflict copies
        #[arg(long)]
        conflicts: bool,
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage folders
    Folder {
        #[command(subcommand)]
        command: FolderCommands,
    },
    /// Delete a note or a folder with its notes
    Delete {
        /// Item ID or unique ID prefix
        id: String,
    },
    /// Synchronise with a sync target directory
    Sync {
        /// Sync target directory (defaults to QUILL_SYNC_DIR)
        #[arg(long, value_name = "DIR")]
        target: Option<PathBuf>,
        /// JSON file with synchronizer settings
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Show pending deletions and items the target refused
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push a refused item again on the next sync
    Retry {
        /// Item ID
        id: String,
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

#[derive(Subcommand)]
pub enum FolderCommands {
    /// Create a folder
    Add {
        /// Folder title
        title: Vec<String>,
    },
    /// List folders
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
