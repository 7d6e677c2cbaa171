use std::path::Path;

use quill_core::db::{DeletedItem, SyncDisabledItem};
use quill_core::{ItemId, SyncConfig, SyncContext};
use serde::Serialize;

use crate::commands::common::{format_timestamp, normalize_item_identifier, open_database};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusReport {
    sync_target: u32,
    has_cursor: bool,
    pending_deletions: Vec<DeletedItem>,
    sync_disabled: Vec<SyncDisabledItem>,
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let sync_target = SyncConfig::default().sync_target;
    let db = open_database(db_path).await?;

    let context: Option<SyncContext> = db
        .load_setting(&SyncContext::settings_key(sync_target))
        .await?;
    let status = StatusReport {
        sync_target,
        has_cursor: context.is_some_and(|context| context.delta.is_some()),
        pending_deletions: db.deleted_items(sync_target).await?,
        sync_disabled: db.sync_disabled_items(sync_target).await?,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Sync target: {}", status.sync_target);
    println!(
        "Remote cursor: {}",
        if status.has_cursor { "saved" } else { "none" }
    );
    println!("Pending remote deletions: {}", status.pending_deletions.len());
    for entry in &status.pending_deletions {
        println!(
            "  {} {}  deleted {}",
            entry.item_type,
            entry.item_id,
            format_timestamp(entry.deleted_time)
        );
    }
    println!("Items refused by the target: {}", status.sync_disabled.len());
    for entry in &status.sync_disabled {
        println!("  {} {}  {}", entry.item_type, entry.item_id, entry.reason);
    }

    Ok(())
}

/// Re-enable sync for an item the target refused.
pub async fn run_retry(id: &str, db_path: &Path) -> Result<(), CliError> {
    let id = normalize_item_identifier(id)?;
    let item_id: ItemId = id
        .parse()
        .map_err(|_| CliError::ItemNotFound(id.clone()))?;

    let db = open_database(db_path).await?;
    db.enable_sync(SyncConfig::default().sync_target, &item_id)
        .await?;
    println!("{item_id}");
    Ok(())
}
