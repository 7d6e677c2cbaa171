//! Item repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::{Folder, Item, ItemId, ItemType, MasterKey, Note, Resource, Tag};
use crate::util::unix_ms_now;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Trait for item storage operations
pub trait ItemRepository {
    /// Get an item of a known type by ID
    fn load(&self, item_type: ItemType, id: &ItemId) -> Result<Option<Item>>;

    /// Get an item by ID, whatever its type
    fn load_any(&self, id: &ItemId) -> Result<Option<Item>>;

    /// Insert or replace an item, storing its fields verbatim
    ///
    /// Timestamps are not touched; call [`Item::touch`] first for a local edit.
    fn save(&self, item: &Item) -> Result<()>;

    /// Delete an item
    ///
    /// With `track`, a deletion ledger entry is recorded for every sync target
    /// that has already received the item, so the deletion is propagated.
    fn delete(&self, item_type: ItemType, id: &ItemId, track: bool) -> Result<()>;

    /// IDs of the notes directly inside a folder
    fn folder_note_ids(&self, folder_id: &ItemId) -> Result<Vec<ItemId>>;

    /// Flag notes as conflicts without changing their timestamps
    fn mark_notes_as_conflict(&self, ids: &[ItemId]) -> Result<()>;

    /// Binary content of a resource
    fn resource_blob(&self, id: &ItemId) -> Result<Option<Vec<u8>>>;

    /// Store the binary content of a resource
    fn set_resource_blob(&self, id: &ItemId, data: &[u8]) -> Result<()>;

    /// List all items of a type, ordered by ID
    fn list(&self, item_type: ItemType) -> Result<Vec<Item>>;

    /// Count items of a type
    fn count(&self, item_type: ItemType) -> Result<usize>;

    /// Items still waiting for decryption
    fn encrypted_items(&self, limit: usize) -> Result<Vec<Item>>;

    /// Number of items still waiting for decryption
    fn encrypted_count(&self) -> Result<usize>;
}

/// `SQLite` implementation of `ItemRepository`
pub struct SqliteItemRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteItemRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

/// Column list for an item table, prefixed with the table alias `t`.
pub(crate) const fn columns(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Note => {
            "t.id, t.parent_id, t.title, t.body, t.created_time, t.updated_time, t.is_conflict, \
             t.encryption_cipher_text, t.encryption_applied"
        }
        ItemType::Folder => {
            "t.id, t.parent_id, t.title, t.created_time, t.updated_time, \
             t.encryption_cipher_text, t.encryption_applied"
        }
        ItemType::Resource => {
            "t.id, t.title, t.mime, t.filename, t.file_extension, t.size, t.created_time, \
             t.updated_time, t.encryption_cipher_text, t.encryption_applied"
        }
        ItemType::Tag => {
            "t.id, t.title, t.created_time, t.updated_time, t.encryption_cipher_text, \
             t.encryption_applied"
        }
        ItemType::MasterKey => {
            "t.id, t.created_time, t.updated_time, t.source_application, t.encryption_method, \
             t.checksum, t.content"
        }
    }
}

/// Number of columns returned by [`columns`].
pub(crate) const fn column_count(item_type: ItemType) -> usize {
    match item_type {
        ItemType::Note => 9,
        ItemType::Folder | ItemType::MasterKey => 7,
        ItemType::Resource => 10,
        ItemType::Tag => 6,
    }
}

fn id_column(row: &Row<'_>, index: usize) -> rusqlite::Result<ItemId> {
    let value: String = row.get(index)?;
    value
        .parse()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

fn opt_id_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<ItemId>> {
    match row.get::<_, Option<String>>(index)? {
        Some(value) if !value.is_empty() => value.parse().map(Some).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
        }),
        _ => Ok(None),
    }
}

/// Parse an item from a row selected with [`columns`].
pub(crate) fn parse_item(item_type: ItemType, row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(match item_type {
        ItemType::Note => Item::Note(Note {
            id: id_column(row, 0)?,
            parent_id: opt_id_column(row, 1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            created_time: row.get(4)?,
            updated_time: row.get(5)?,
            is_conflict: row.get(6)?,
            encryption_cipher_text: row.get(7)?,
            encryption_applied: row.get(8)?,
        }),
        ItemType::Folder => Item::Folder(Folder {
            id: id_column(row, 0)?,
            parent_id: opt_id_column(row, 1)?,
            title: row.get(2)?,
            created_time: row.get(3)?,
            updated_time: row.get(4)?,
            encryption_cipher_text: row.get(5)?,
            encryption_applied: row.get(6)?,
        }),
        ItemType::Resource => Item::Resource(Resource {
            id: id_column(row, 0)?,
            title: row.get(1)?,
            mime: row.get(2)?,
            filename: row.get(3)?,
            file_extension: row.get(4)?,
            size: row.get(5)?,
            created_time: row.get(6)?,
            updated_time: row.get(7)?,
            encryption_cipher_text: row.get(8)?,
            encryption_applied: row.get(9)?,
        }),
        ItemType::Tag => Item::Tag(Tag {
            id: id_column(row, 0)?,
            title: row.get(1)?,
            created_time: row.get(2)?,
            updated_time: row.get(3)?,
            encryption_cipher_text: row.get(4)?,
            encryption_applied: row.get(5)?,
        }),
        ItemType::MasterKey => Item::MasterKey(MasterKey {
            id: id_column(row, 0)?,
            created_time: row.get(1)?,
            updated_time: row.get(2)?,
            source_application: row.get(3)?,
            encryption_method: row.get(4)?,
            checksum: row.get(5)?,
            content: row.get(6)?,
        }),
    })
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn load(&self, item_type: ItemType, id: &ItemId) -> Result<Option<Item>> {
        let sql = format!(
            "SELECT {} FROM {} t WHERE t.id = ?",
            columns(item_type),
            item_type.table()
        );
        let item = self
            .conn
            .query_row(&sql, params![id.as_str()], |row| parse_item(item_type, row))
            .optional()?;
        Ok(item)
    }

    fn load_any(&self, id: &ItemId) -> Result<Option<Item>> {
        for item_type in ItemType::SYNC_ORDER {
            if let Some(item) = self.load(item_type, id)? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    fn save(&self, item: &Item) -> Result<()> {
        match item {
            Item::Note(note) => {
                self.conn.execute(
                    "INSERT INTO notes (id, parent_id, title, body, created_time, updated_time,
                        is_conflict, encryption_cipher_text, encryption_applied)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(id) DO UPDATE SET
                        parent_id = excluded.parent_id,
                        title = excluded.title,
                        body = excluded.body,
                        created_time = excluded.created_time,
                        updated_time = excluded.updated_time,
                        is_conflict = excluded.is_conflict,
                        encryption_cipher_text = excluded.encryption_cipher_text,
                        encryption_applied = excluded.encryption_applied",
                    params![
                        note.id.as_str(),
                        note.parent_id.map(|id| id.as_str()),
                        note.title,
                        note.body,
                        note.created_time,
                        note.updated_time,
                        note.is_conflict,
                        note.encryption_cipher_text,
                        note.encryption_applied
                    ],
                )?;
            }
            Item::Folder(folder) => {
                self.conn.execute(
                    "INSERT INTO folders (id, parent_id, title, created_time, updated_time,
                        encryption_cipher_text, encryption_applied)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                        parent_id = excluded.parent_id,
                        title = excluded.title,
                        created_time = excluded.created_time,
                        updated_time = excluded.updated_time,
                        encryption_cipher_text = excluded.encryption_cipher_text,
                        encryption_applied = excluded.encryption_applied",
                    params![
                        folder.id.as_str(),
                        folder.parent_id.map(|id| id.as_str()),
                        folder.title,
                        folder.created_time,
                        folder.updated_time,
                        folder.encryption_cipher_text,
                        folder.encryption_applied
                    ],
                )?;
            }
            Item::Resource(resource) => {
                // The blob column is left alone; it has its own setter.
                self.conn.execute(
                    "INSERT INTO resources (id, title, mime, filename, file_extension, size,
                        created_time, updated_time, encryption_cipher_text, encryption_applied)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(id) DO UPDATE SET
                        title = excluded.title,
                        mime = excluded.mime,
                        filename = excluded.filename,
                        file_extension = excluded.file_extension,
                        size = excluded.size,
                        created_time = excluded.created_time,
                        updated_time = excluded.updated_time,
                        encryption_cipher_text = excluded.encryption_cipher_text,
                        encryption_applied = excluded.encryption_applied",
                    params![
                        resource.id.as_str(),
                        resource.title,
                        resource.mime,
                        resource.filename,
                        resource.file_extension,
                        resource.size,
                        resource.created_time,
                        resource.updated_time,
                        resource.encryption_cipher_text,
                        resource.encryption_applied
                    ],
                )?;
            }
            Item::Tag(tag) => {
                self.conn.execute(
                    "INSERT INTO tags (id, title, created_time, updated_time,
                        encryption_cipher_text, encryption_applied)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        title = excluded.title,
                        created_time = excluded.created_time,
                        updated_time = excluded.updated_time,
                        encryption_cipher_text = excluded.encryption_cipher_text,
                        encryption_applied = excluded.encryption_applied",
                    params![
                        tag.id.as_str(),
                        tag.title,
                        tag.created_time,
                        tag.updated_time,
                        tag.encryption_cipher_text,
                        tag.encryption_applied
                    ],
                )?;
            }
            Item::MasterKey(key) => {
                self.conn.execute(
                    "INSERT INTO master_keys (id, created_time, updated_time, source_application,
                        encryption_method, checksum, content)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                        created_time = excluded.created_time,
                        updated_time = excluded.updated_time,
                        source_application = excluded.source_application,
                        encryption_method = excluded.encryption_method,
                        checksum = excluded.checksum,
                        content = excluded.content",
                    params![
                        key.id.as_str(),
                        key.created_time,
                        key.updated_time,
                        key.source_application,
                        key.encryption_method,
                        key.checksum,
                        key.content
                    ],
                )?;
            }
        }
        Ok(())
    }

    fn delete(&self, item_type: ItemType, id: &ItemId, track: bool) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", item_type.table());
        let rows = self.conn.execute(&sql, params![id.as_str()])?;

        if track && rows > 0 {
            self.conn.execute(
                "INSERT OR IGNORE INTO deleted_items (item_type, item_id, sync_target, deleted_time)
                 SELECT ?1, item_id, sync_target, ?2 FROM sync_items WHERE item_id = ?3",
                params![item_type.code(), unix_ms_now(), id.as_str()],
            )?;
        }

        Ok(())
    }

    fn folder_note_ids(&self, folder_id: &ItemId) -> Result<Vec<ItemId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM notes WHERE parent_id = ? ORDER BY id")?;
        let ids = stmt
            .query_map(params![folder_id.as_str()], |row| id_column(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn mark_notes_as_conflict(&self, ids: &[ItemId]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("UPDATE notes SET is_conflict = 1 WHERE id = ?")?;
        for id in ids {
            stmt.execute(params![id.as_str()])?;
        }
        Ok(())
    }

    fn resource_blob(&self, id: &ItemId) -> Result<Option<Vec<u8>>> {
        let blob: Option<Option<Vec<u8>>> = self
            .conn
            .query_row(
                "SELECT blob FROM resources WHERE id = ?",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.flatten())
    }

    fn set_resource_blob(&self, id: &ItemId, data: &[u8]) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE resources SET blob = ? WHERE id = ?",
            params![data, id.as_str()],
        )?;
        if rows == 0 {
            return Err(crate::error::Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn list(&self, item_type: ItemType) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM {} t ORDER BY t.id",
            columns(item_type),
            item_type.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map([], |row| parse_item(item_type, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn count(&self, item_type: ItemType) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", item_type.table());
        let count: usize = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    fn encrypted_items(&self, limit: usize) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for item_type in ItemType::SYNC_ORDER {
            if !item_type.supports_encryption() || items.len() >= limit {
                continue;
            }
            let sql = format!(
                "SELECT {} FROM {} t WHERE t.encryption_applied = 1 ORDER BY t.id LIMIT ?",
                columns(item_type),
                item_type.table()
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let remaining = (limit - items.len()) as i64;
            let rows = stmt
                .query_map(params![remaining], |row| parse_item(item_type, row))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            items.extend(rows);
        }
        Ok(items)
    }

    fn encrypted_count(&self) -> Result<usize> {
        let mut total = 0;
        for item_type in ItemType::SYNC_ORDER {
            if !item_type.supports_encryption() {
                continue;
            }
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE encryption_applied = 1",
                item_type.table()
            );
            let count: usize = self.conn.query_row(&sql, [], |row| row.get(0))?;
            total += count;
        }
        Ok(total)
    }
}
