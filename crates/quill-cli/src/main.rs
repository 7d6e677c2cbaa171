//! Quill CLI - notes from the terminal, synchronised through a directory
//!
//! The sync target can be any folder: a mounted share, a USB stick or a
//! directory kept in sync by another tool.

mod cli;
mod commands;
mod error;
mod fs_driver;


use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands, FolderCommands};
use crate::commands::add::run_add;
use crate::commands::common::{resolve_db_path, resolve_sync_dir};
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::folder::{run_folder_add, run_folder_list};
use crate::commands::list::{run_list, ListFilter};
use crate::commands::status::{run_retry, run_status};
use crate::commands::sync::run_sync;
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
                .add_directive("quill=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Add {
            title,
            body,
            folder,
        }) => run_add(&title, body, folder.as_deref(), &db_path).await?,
        Some(Commands::List {
            folder,
            conflicts,
            limit,
            json,
        }) => {
            let filter = ListFilter {
                folder,
                conflicts_only: conflicts,
                limit,
            };
            run_list(&filter, json, &db_path).await?;
        }
        Some(Commands::Folder { command }) => match command {
            FolderCommands::Add { title } => run_folder_add(&title, &db_path).await?,
            FolderCommands::List { json } => run_folder_list(json, &db_path).await?,
        },
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Sync { target, config }) => {
            let sync_dir = resolve_sync_dir(target).ok_or(CliError::SyncNotConfigured)?;
            run_sync(&db_path, &sync_dir, config.as_deref()).await?;
        }
        Some(Commands::Status { json }) => run_status(json, &db_path).await?,
        Some(Commands::Retry { id }) => run_retry(&id, &db_path).await?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            // Quick capture mode: quill "my note"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.note, None, None, &db_path).await?;
            }
        }
    }

    Ok(())
}
