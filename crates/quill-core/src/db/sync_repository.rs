//! Sync metadata store: per-target sync times, the deletion ledger and
//! sync-disabled bookkeeping.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Item, ItemId, ItemType};
use rusqlite::{params, Connection, OptionalExtension};

use super::item_repository::{column_count, columns, parse_item};

/// A deletion that still has to be propagated to a sync target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedItem {
    pub item_type: ItemType,
    pub item_id: ItemId,
    pub sync_target: u32,
    pub deleted_time: i64,
}

/// An item the target refused; skipped until sync is re-enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDisabledItem {
    pub item_type: ItemType,
    pub item_id: ItemId,
    pub reason: String,
}

/// Keyset position in the dirty-item scan.
///
/// Types are visited in [`ItemType::SYNC_ORDER`]; inside a type, IDs ascend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyCursor {
    pub type_index: usize,
    pub after_id: Option<ItemId>,
}

/// A dirty item together with its last sync time (0 when never synced).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyItem {
    pub item: Item,
    pub sync_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyPage {
    pub items: Vec<DirtyItem>,
    pub has_more: bool,
    pub cursor: DirtyCursor,
}

/// Trait for sync metadata operations
pub trait SyncMetadataStore {
    /// Next page of items whose local changes have not reached `target`
    ///
    /// An item is dirty when it has never been synced to the target or was
    /// updated after its last sync, is not sync-disabled, and is not a
    /// conflict note.
    fn items_that_need_sync(
        &self,
        target: u32,
        cursor: &DirtyCursor,
        limit: usize,
    ) -> Result<DirtyPage>;

    /// Last sync time of an item, 0 when never synced
    fn sync_time(&self, target: u32, id: &ItemId) -> Result<i64>;

    /// Record that the item is now in sync with the target
    fn mark_synced(&self, target: u32, item_type: ItemType, id: &ItemId, time: i64) -> Result<()>;

    /// Pending deletion ledger entries for a target
    fn deleted_items(&self, target: u32) -> Result<Vec<DeletedItem>>;

    /// Forget a ledger entry once the remote deletion is confirmed
    fn remove_ledger_entry(&self, target: u32, id: &ItemId) -> Result<()>;

    /// Whether a local deletion of this item is still waiting to be pushed
    fn is_pending_deletion(&self, target: u32, id: &ItemId) -> Result<bool>;

    /// Drop sync rows whose item no longer exists locally
    fn delete_orphan_sync_items(&self) -> Result<usize>;

    /// IDs of every item that has been uploaded to the target.
    ///
    /// Refused items have a row but were never uploaded, so they are left out.
    fn synced_item_ids(&self, target: u32) -> Result<Vec<ItemId>>;

    /// Stop pushing an item the target refused
    fn mark_sync_disabled(
        &self,
        target: u32,
        item_type: ItemType,
        id: &ItemId,
        reason: &str,
    ) -> Result<()>;

    /// Allow a previously refused item to be pushed again
    fn enable_sync(&self, target: u32, id: &ItemId) -> Result<()>;

    /// Items currently refused by the target
    fn sync_disabled_items(&self, target: u32) -> Result<Vec<SyncDisabledItem>>;
}

/// `SQLite` implementation of `SyncMetadataStore`
pub struct SqliteSyncRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn dirty_of_type(
        &self,
        target: u32,
        item_type: ItemType,
        after_id: Option<&ItemId>,
        limit: usize,
    ) -> Result<Vec<DirtyItem>> {
        let conflict_filter = if item_type == ItemType::Note {
            "AND t.is_conflict = 0"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {columns}, COALESCE(s.sync_time, 0)
             FROM {table} t
             LEFT JOIN sync_items s ON s.item_id = t.id AND s.sync_target = ?1
             WHERE (s.id IS NULL OR (s.sync_time < t.updated_time AND s.sync_disabled = 0))
               {conflict_filter}
               AND t.id > ?2
             ORDER BY t.id
             LIMIT ?3",
            columns = columns(item_type),
            table = item_type.table(),
        );
        let after = after_id.map(ItemId::as_str).unwrap_or_default();
        let sync_time_index = column_count(item_type);

        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![target, after, limit as i64], |row| {
                Ok(DirtyItem {
                    item: parse_item(item_type, row)?,
                    sync_time: row.get(sync_time_index)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }
}

fn item_type_column(code: i64) -> Result<ItemType> {
    ItemType::from_code(code)
        .ok_or_else(|| Error::Database(format!("unknown item type code in sync tables: {code}")))
}

fn item_id_column(value: &str) -> Result<ItemId> {
    value
        .parse()
        .map_err(|_| Error::Database(format!("invalid item id in sync tables: {value}")))
}

impl SyncMetadataStore for SqliteSyncRepository<'_> {
    fn items_that_need_sync(
        &self,
        target: u32,
        cursor: &DirtyCursor,
        limit: usize,
    ) -> Result<DirtyPage> {
        let mut items = Vec::new();
        let mut cursor = cursor.clone();

        while let Some(&item_type) = ItemType::SYNC_ORDER.get(cursor.type_index) {
            let remaining = limit.saturating_sub(items.len());
            // One extra row tells whether more items follow.
            let mut rows =
                self.dirty_of_type(target, item_type, cursor.after_id.as_ref(), remaining + 1)?;

            if rows.len() > remaining {
                rows.truncate(remaining);
                if let Some(last) = rows.last() {
                    cursor.after_id = Some(last.item.id());
                }
                items.extend(rows);
                return Ok(DirtyPage {
                    items,
                    has_more: true,
                    cursor,
                });
            }

            items.extend(rows);
            cursor = DirtyCursor {
                type_index: cursor.type_index + 1,
                after_id: None,
            };
        }

        Ok(DirtyPage {
            items,
            has_more: false,
            cursor,
        })
    }

    fn sync_time(&self, target: u32, id: &ItemId) -> Result<i64> {
        let time: Option<i64> = self
            .conn
            .query_row(
                "SELECT sync_time FROM sync_items WHERE sync_target = ? AND item_id = ?",
                params![target, id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(time.unwrap_or(0))
    }

    fn mark_synced(&self, target: u32, item_type: ItemType, id: &ItemId, time: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_items (sync_target, item_type, item_id, sync_time)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(sync_target, item_id) DO UPDATE SET
                item_type = excluded.item_type,
                sync_time = excluded.sync_time,
                sync_disabled = 0,
                sync_disabled_reason = ''",
            params![target, item_type.code(), id.as_str(), time],
        )?;
        Ok(())
    }

    fn deleted_items(&self, target: u32) -> Result<Vec<DeletedItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_type, item_id, sync_target, deleted_time
             FROM deleted_items
             WHERE sync_target = ?
             ORDER BY deleted_time, id",
        )?;
        let rows = stmt
            .query_map(params![target], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(code, id, sync_target, deleted_time)| {
                Ok(DeletedItem {
                    item_type: item_type_column(code)?,
                    item_id: item_id_column(&id)?,
                    sync_target,
                    deleted_time,
                })
            })
            .collect()
    }

    fn remove_ledger_entry(&self, target: u32, id: &ItemId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM deleted_items WHERE sync_target = ? AND item_id = ?",
            params![target, id.as_str()],
        )?;
        Ok(())
    }

    fn is_pending_deletion(&self, target: u32, id: &ItemId) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM deleted_items WHERE sync_target = ? AND item_id = ?)",
            params![target, id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn delete_orphan_sync_items(&self) -> Result<usize> {
        let mut removed = 0;
        for item_type in ItemType::SYNC_ORDER {
            let sql = format!(
                "DELETE FROM sync_items
                 WHERE item_type = ? AND item_id NOT IN (SELECT id FROM {})",
                item_type.table()
            );
            removed += self.conn.execute(&sql, params![item_type.code()])?;
        }
        if removed > 0 {
            tracing::debug!(removed, "Deleted orphan sync items");
        }
        Ok(removed)
    }

    fn synced_item_ids(&self, target: u32) -> Result<Vec<ItemId>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT item_id FROM sync_items
                 WHERE sync_target = ? AND sync_time > 0
                 ORDER BY item_id",
            )?;
        let ids = stmt
            .query_map(params![target], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids.iter().map(|id| item_id_column(id)).collect()
    }

    fn mark_sync_disabled(
        &self,
        target: u32,
        item_type: ItemType,
        id: &ItemId,
        reason: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_items (sync_target, item_type, item_id, sync_time, sync_disabled, sync_disabled_reason)
             VALUES (?1, ?2, ?3, 0, 1, ?4)
             ON CONFLICT(sync_target, item_id) DO UPDATE SET
                sync_disabled = 1,
                sync_disabled_reason = excluded.sync_disabled_reason",
            params![target, item_type.code(), id.as_str(), reason],
        )?;
        Ok(())
    }

    fn enable_sync(&self, target: u32, id: &ItemId) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_items SET sync_disabled = 0, sync_disabled_reason = ''
             WHERE sync_target = ? AND item_id = ? AND sync_disabled = 1",
            params![target, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn sync_disabled_items(&self, target: u32) -> Result<Vec<SyncDisabledItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_type, item_id, sync_disabled_reason
             FROM sync_items
             WHERE sync_target = ? AND sync_disabled = 1
             ORDER BY item_id",
        )?;
        let rows = stmt
            .query_map(params![target], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(code, id, reason)| {
                Ok(SyncDisabledItem {
                    item_type: item_type_column(code)?,
                    item_id: item_id_column(&id)?,
                    reason,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, ItemRepository, SqliteItemRepository};
    use crate::models::{Folder, Note, Tag};
    use pretty_assertions::assert_eq;

    const TARGET: u32 = 1;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn dirty_ids(store: &SqliteSyncRepository<'_>) -> Vec<ItemId> {
        store
            .items_that_need_sync(TARGET, &DirtyCursor::default(), 100)
            .unwrap()
            .items
            .into_iter()
            .map(|dirty| dirty.item.id())
            .collect()
    }

    #[test]
    fn test_new_items_are_dirty_in_type_order() {
        let db = setup();
        let items = SqliteItemRepository::new(db.connection());
        let store = SqliteSyncRepository::new(db.connection());

        let tag = Tag::new("t");
        let folder = Folder::new("f");
        let note = Note::new(Some(folder.id), "n", "");
        for item in [tag.clone().into(), note.clone().into(), folder.clone().into()] {
            items.save(&item).unwrap();
        }

        assert_eq!(dirty_ids(&store), vec![folder.id, note.id, tag.id]);
    }

    #[test]
    fn test_synced_item_is_clean_until_updated() {
        let db = setup();
        let items = SqliteItemRepository::new(db.connection());
        let store = SqliteSyncRepository::new(db.connection());

        let mut note = Note::new(None, "n", "");
        items.save(&note.clone().into()).unwrap();
        store
            .mark_synced(TARGET, ItemType::Note, &note.id, note.updated_time)
            .unwrap();
        assert!(dirty_ids(&store).is_empty());
        assert_eq!(store.sync_time(TARGET, &note.id).unwrap(), note.updated_time);

        note.updated_time += 1;
        items.save(&note.clone().into()).unwrap();
        assert_eq!(dirty_ids(&store), vec![note.id]);

        // Other targets keep their own state
        assert_eq!(store.sync_time(2, &note.id).unwrap(), 0);
    }

    #[test]
    fn test_conflict_notes_are_never_dirty() {
        let db = setup();
        let items = SqliteItemRepository::new(db.connection());
        let store = SqliteSyncRepository::new(db.connection());

        let note = Note::new(None, "n", "").conflict_copy();
        items.save(&note.into()).unwrap();
        assert!(dirty_ids(&store).is_empty());
    }

    #[test]
    fn test_pagination_never_repeats_items() {
        let db = setup();
        let items = SqliteItemRepository::new(db.connection());
        let store = SqliteSyncRepository::new(db.connection());

        let mut expected = Vec::new();
        for index in 0..3 {
            let folder = Folder::new(format!("f{index}"));
            expected.push(folder.id);
            items.save(&folder.into()).unwrap();
        }
        for index in 0..4 {
            let note = Note::new(None, format!("n{index}"), "");
            expected.push(note.id);
            items.save(&note.into()).unwrap();
        }
        expected[..3].sort();
        expected[3..].sort();

        let mut seen = Vec::new();
        let mut cursor = DirtyCursor::default();
        let mut pages = 0;
        loop {
            let page = store.items_that_need_sync(TARGET, &cursor, 2).unwrap();
            assert!(page.items.len() <= 2);
            seen.extend(page.items.iter().map(|dirty| dirty.item.id()));
            cursor = page.cursor;
            pages += 1;
            if !page.has_more {
                break;
            }
        }

        assert_eq!(seen, expected);
        assert_eq!(pages, 4);
    }

    #[test]
    fn test_ledger_lifecycle() {
        let db = setup();
        let items = SqliteItemRepository::new(db.connection());
        let store = SqliteSyncRepository::new(db.connection());

        let note = Note::new(None, "n", "");
        items.save(&note.clone().into()).unwrap();
        store
            .mark_synced(TARGET, ItemType::Note, &note.id, note.updated_time)
            .unwrap();
        items.delete(ItemType::Note, &note.id, true).unwrap();

        let ledger = store.deleted_items(TARGET).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].item_id, note.id);
        assert_eq!(ledger[0].item_type, ItemType::Note);
        assert!(store.is_pending_deletion(TARGET, &note.id).unwrap());
        assert!(store.deleted_items(2).unwrap().is_empty());

        store.remove_ledger_entry(TARGET, &note.id).unwrap();
        assert!(store.deleted_items(TARGET).unwrap().is_empty());
        assert!(!store.is_pending_deletion(TARGET, &note.id).unwrap());
    }

    #[test]
    fn test_never_synced_item_leaves_no_ledger_entry() {
        let db = setup();
        let items = SqliteItemRepository::new(db.connection());
        let store = SqliteSyncRepository::new(db.connection());

        let note = Note::new(None, "local only", "");
        items.save(&note.clone().into()).unwrap();
        items.delete(ItemType::Note, &note.id, true).unwrap();

        assert!(store.deleted_items(TARGET).unwrap().is_empty());
    }

    #[test]
    fn test_orphan_sync_items_are_removed() {
        let db = setup();
        let items = SqliteItemRepository::new(db.connection());
        let store = SqliteSyncRepository::new(db.connection());

        let kept = Folder::new("kept");
        let gone = Folder::new("gone");
        for folder in [&kept, &gone] {
            items.save(&folder.clone().into()).unwrap();
            store
                .mark_synced(TARGET, ItemType::Folder, &folder.id, folder.updated_time)
                .unwrap();
        }
        items.delete(ItemType::Folder, &gone.id, false).unwrap();

        assert_eq!(store.delete_orphan_sync_items().unwrap(), 1);
        assert_eq!(store.synced_item_ids(TARGET).unwrap(), vec![kept.id]);
    }

    #[test]
    fn test_sync_disabled_items_are_skipped_until_enabled() {
        let db = setup();
        let items = SqliteItemRepository::new(db.connection());
        let store = SqliteSyncRepository::new(db.connection());

        let note = Note::new(None, "too big", "");
        items.save(&note.clone().into()).unwrap();
        store
            .mark_sync_disabled(TARGET, ItemType::Note, &note.id, "rejected")
            .unwrap();

        assert!(dirty_ids(&store).is_empty());
        assert!(store.synced_item_ids(TARGET).unwrap().is_empty());
        assert_eq!(
            store.sync_disabled_items(TARGET).unwrap(),
            vec![SyncDisabledItem {
                item_type: ItemType::Note,
                item_id: note.id,
                reason: "rejected".to_string(),
            }]
        );

        store.enable_sync(TARGET, &note.id).unwrap();
        assert_eq!(dirty_ids(&store), vec![note.id]);
        assert!(store.sync_disabled_items(TARGET).unwrap().is_empty());
        assert!(store.enable_sync(TARGET, &note.id).is_err());
    }
}
