//! Database layer for Quill

mod connection;
mod item_repository;
mod migrations;
mod settings_repository;
mod sync_repository;

pub use connection::Database;
pub use item_repository::{ItemRepository, SqliteItemRepository};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
pub use sync_repository::{
    DeletedItem, DirtyCursor, DirtyItem, DirtyPage, SqliteSyncRepository, SyncDisabledItem,
    SyncMetadataStore,
};
