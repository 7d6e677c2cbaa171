//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    debug_assert_eq!(get_version(conn)?, CURRENT_VERSION);
    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}

/// Migration to version 1: item tables
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            parent_id TEXT,
            title TEXT NOT NULL DEFAULT '',
            created_time INTEGER NOT NULL,
            updated_time INTEGER NOT NULL,
            encryption_cipher_text TEXT NOT NULL DEFAULT '',
            encryption_applied INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            parent_id TEXT,
            title TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            created_time INTEGER NOT NULL,
            updated_time INTEGER NOT NULL,
            is_conflict INTEGER NOT NULL DEFAULT 0,
            encryption_cipher_text TEXT NOT NULL DEFAULT '',
            encryption_applied INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_notes_parent ON notes(parent_id);
        CREATE INDEX IF NOT EXISTS idx_notes_updated ON notes(updated_time DESC);

        CREATE TABLE IF NOT EXISTS resources (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            mime TEXT NOT NULL DEFAULT '',
            filename TEXT NOT NULL DEFAULT '',
            file_extension TEXT NOT NULL DEFAULT '',
            size INTEGER NOT NULL DEFAULT 0,
            created_time INTEGER NOT NULL,
            updated_time INTEGER NOT NULL,
            encryption_cipher_text TEXT NOT NULL DEFAULT '',
            encryption_applied INTEGER NOT NULL DEFAULT 0,
            blob BLOB
        );

        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            created_time INTEGER NOT NULL,
            updated_time INTEGER NOT NULL,
            encryption_cipher_text TEXT NOT NULL DEFAULT '',
            encryption_applied INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS master_keys (
            id TEXT PRIMARY KEY,
            created_time INTEGER NOT NULL,
            updated_time INTEGER NOT NULL,
            source_application TEXT NOT NULL DEFAULT '',
            encryption_method INTEGER NOT NULL DEFAULT 0,
            checksum TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        INSERT INTO schema_version (version) VALUES (1);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: sync metadata and deletion ledger
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sync_target INTEGER NOT NULL,
            item_type INTEGER NOT NULL,
            item_id TEXT NOT NULL,
            sync_time INTEGER NOT NULL DEFAULT 0,
            sync_disabled INTEGER NOT NULL DEFAULT 0,
            sync_disabled_reason TEXT NOT NULL DEFAULT '',
            UNIQUE (sync_target, item_id)
        );
        CREATE INDEX IF NOT EXISTS idx_sync_items_item ON sync_items(item_type, item_id);

        CREATE TABLE IF NOT EXISTS deleted_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_type INTEGER NOT NULL,
            item_id TEXT NOT NULL,
            sync_target INTEGER NOT NULL,
            deleted_time INTEGER NOT NULL,
            UNIQUE (item_id, sync_target)
        );
        CREATE INDEX IF NOT EXISTS idx_deleted_items_target ON deleted_items(sync_target);

        INSERT INTO schema_version (version) VALUES (2);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version 2");
    Ok(())
}
