use std::path::Path;
use std::sync::Arc;

use quill_core::{SyncConfig, SyncContext, SyncOptions, SyncOutcome, Synchronizer};
use tokio_util::sync::CancellationToken;

use crate::commands::common::open_database;
use crate::error::CliError;
use crate::fs_driver::FileSystemFileApi;

pub fn load_sync_config(path: Option<&Path>) -> Result<SyncConfig, CliError> {
    match path {
        Some(path) => {
            let payload = std::fs::read_to_string(path)?;
            Ok(SyncConfig::from_json(&payload)?)
        }
        None => Ok(SyncConfig::default()),
    }
}

/// Synchronize the local database with a directory target.
///
/// Ctrl-C cancels the run; work done so far is kept and the context is
/// saved so the next run resumes where this one stopped.
pub async fn sync_with_directory(
    db_path: &Path,
    sync_dir: &Path,
    config: SyncConfig,
    cancellation: CancellationToken,
) -> Result<SyncOutcome, CliError> {
    let db = open_database(db_path).await?;
    let context_key = SyncContext::settings_key(config.sync_target);
    let context: SyncContext = db.load_setting(&context_key).await?.unwrap_or_default();

    let api = Arc::new(FileSystemFileApi::new(sync_dir));
    let synchronizer = Synchronizer::new(db.clone(), api, config)?;
    let outcome = synchronizer
        .start(
            SyncOptions::default()
                .with_context(context)
                .with_cancellation(cancellation),
        )
        .await?;

    db.save_setting(&context_key, &outcome.context).await?;
    Ok(outcome)
}

pub async fn run_sync(
    db_path: &Path,
    sync_dir: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_sync_config(config_path)?;
    let cancellation = CancellationToken::new();

    let interrupt = cancellation.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current item");
            interrupt.cancel();
        }
    });

    let result = sync_with_directory(db_path, sync_dir, config, cancellation).await;
    signal_task.abort();
    let outcome = result?;

    for line in outcome.report.to_lines() {
        println!("{line}");
    }
    for error in &outcome.report.errors {
        eprintln!("Error: {error}");
    }
    if outcome.items_to_decrypt > 0 {
        println!("Items waiting for decryption: {}", outcome.items_to_decrypt);
    }

    Ok(())
}
