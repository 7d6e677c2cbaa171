//! Shared database service wrapper used across clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{
    Database, DeletedItem, ItemRepository, SettingsRepository, SqliteItemRepository,
    SqliteSettingsRepository, SqliteSyncRepository, SyncDisabledItem, SyncMetadataStore,
};
use crate::models::{Folder, Item, ItemId, ItemType, Note};
use crate::{Error, Result};

/// Thread-safe service for DB and repository operations.
///
/// The lock is only held for the duration of a closure, never across an
/// `.await` on remote storage.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = Database::open(&db_path)?;
        tracing::debug!("Opened database at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the database file, `None` for in-memory databases.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run `f` with the connection, outside any explicit transaction.
    pub async fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let db = self.db.lock().await;
        f(db.connection())
    }

    /// Run `f` inside a transaction, committing only when it succeeds.
    pub async fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Load any item by ID.
    pub async fn load_item(&self, id: &ItemId) -> Result<Option<Item>> {
        self.with_connection(|conn| SqliteItemRepository::new(conn).load_any(id))
            .await
    }

    /// List items of one type, ordered by ID.
    pub async fn list_items(&self, item_type: ItemType) -> Result<Vec<Item>> {
        self.with_connection(|conn| SqliteItemRepository::new(conn).list(item_type))
            .await
    }

    /// Store an item exactly as given.
    pub async fn save_item(&self, item: &Item) -> Result<()> {
        self.with_connection(|conn| SqliteItemRepository::new(conn).save(item))
            .await
    }

    /// Record a local edit: bump `updated_time` and store the item.
    pub async fn update_item(&self, mut item: Item) -> Result<Item> {
        item.touch();
        self.save_item(&item).await?;
        Ok(item)
    }

    /// Create a folder.
    pub async fn create_folder(&self, title: &str) -> Result<Folder> {
        let folder = Folder::new(title);
        self.save_item(&folder.clone().into()).await?;
        Ok(folder)
    }

    /// Create a note, optionally inside a folder.
    pub async fn create_note(
        &self,
        parent_id: Option<ItemId>,
        title: &str,
        body: &str,
    ) -> Result<Note> {
        let note = Note::new(parent_id, title, body);
        self.save_item(&note.clone().into()).await?;
        Ok(note)
    }

    /// Delete an item as a user action.
    ///
    /// The deletion is tracked so it reaches every target that had the item.
    /// Deleting a folder also deletes the notes it contains.
    pub async fn delete_item(&self, id: &ItemId) -> Result<()> {
        self.transaction(|conn| {
            let items = SqliteItemRepository::new(conn);
            let item = items
                .load_any(id)?
                .ok_or_else(|| Error::NotFound(id.to_string()))?;

            if item.item_type() == ItemType::Folder {
                for note_id in items.folder_note_ids(id)? {
                    items.delete(ItemType::Note, &note_id, true)?;
                }
            }
            items.delete(item.item_type(), id, true)
        })
        .await
    }

    /// Attach binary content to a resource.
    pub async fn set_resource_blob(&self, id: &ItemId, data: &[u8]) -> Result<()> {
        self.with_connection(|conn| SqliteItemRepository::new(conn).set_resource_blob(id, data))
            .await
    }

    pub async fn resource_blob(&self, id: &ItemId) -> Result<Option<Vec<u8>>> {
        self.with_connection(|conn| SqliteItemRepository::new(conn).resource_blob(id))
            .await
    }

    /// Deletions not yet propagated to the target.
    pub async fn deleted_items(&self, target: u32) -> Result<Vec<DeletedItem>> {
        self.with_connection(|conn| SqliteSyncRepository::new(conn).deleted_items(target))
            .await
    }

    /// Items the target refused.
    pub async fn sync_disabled_items(&self, target: u32) -> Result<Vec<SyncDisabledItem>> {
        self.with_connection(|conn| SqliteSyncRepository::new(conn).sync_disabled_items(target))
            .await
    }

    /// Retry a refused item on the next sync.
    pub async fn enable_sync(&self, target: u32, id: &ItemId) -> Result<()> {
        self.with_connection(|conn| SqliteSyncRepository::new(conn).enable_sync(target, id))
            .await
    }

    pub async fn load_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.with_connection(|conn| SqliteSettingsRepository::new(conn).get_json(key))
            .await
    }

    pub async fn save_setting<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        self.with_connection(|conn| SqliteSettingsRepository::new(conn).set_json(key, value))
            .await
    }
}
