//! Push phase: upload local changes and resolve conflicts.

use std::collections::HashSet;

use crate::db::{
    DirtyCursor, DirtyItem, ItemRepository, SqliteItemRepository, SqliteSyncRepository,
    SyncMetadataStore,
};
use crate::error::{Error, Result};
use crate::file_api::{resource_path, RESOURCE_DIR, SYNC_DIR};
use crate::models::{Item, ItemType, Note};
use crate::util::unix_ms_now;

use super::pull::remove_local_folder;
use super::session::Session;
use super::{FaultPoint, SyncAction, Synchronizer};

impl Synchronizer {
    pub(super) async fn push(&self, session: &mut Session) -> Result<()> {
        self.api.mkdir(SYNC_DIR).await?;
        self.api.mkdir(RESOURCE_DIR).await?;

        let sync_target = session.sync_target;
        let page_size = self.config.page_size;
        let mut done_paths = HashSet::new();
        let mut cursor = DirtyCursor::default();

        while !session.is_cancelled() {
            let page = self
                .db
                .with_connection(|conn| {
                    SqliteSyncRepository::new(conn).items_that_need_sync(sync_target, &cursor, page_size)
                })
                .await?;

            self.push_page(session, &page.items, &mut done_paths).await?;
            if self.replay_dirty_page() {
                self.push_page(session, &page.items, &mut done_paths).await?;
            }

            if !page.has_more {
                break;
            }
            cursor = page.cursor;
        }

        Ok(())
    }

    async fn push_page(
        &self,
        session: &mut Session,
        items: &[DirtyItem],
        done_paths: &mut HashSet<String>,
    ) -> Result<()> {
        for dirty in items {
            if session.is_cancelled() {
                break;
            }

            let path = dirty.item.system_path();
            if !done_paths.insert(path.clone()) {
                return Err(Error::PathProcessedTwice(path));
            }

            if let Err(error) = self.push_item(session, dirty, &path).await {
                if error.is_fatal() {
                    return Err(error);
                }
                session.record_error(Some(dirty.item.id()), Some(path.as_str()), &error);
            }
        }
        Ok(())
    }

    async fn push_item(&self, session: &mut Session, dirty: &DirtyItem, path: &str) -> Result<()> {
        let local = &dirty.item;
        let remote = self.load_remote(path).await?;

        let conflict = if local.item_type() == ItemType::Note {
            SyncAction::NoteConflict
        } else {
            SyncAction::ItemConflict
        };
        let (action, reason) = match &remote {
            None if dirty.sync_time == 0 => (
                SyncAction::CreateRemote,
                "remote does not exist, and local is new and has never been synced",
            ),
            None => (conflict, "remote has been deleted, but local has changes"),
            Some(remote) if remote.updated_time() > dirty.sync_time => {
                (conflict, "both remote and local have changes")
            }
            Some(_) => (SyncAction::UpdateRemote, "local has changes"),
        };

        session.log_operation(action, reason, None, Some(local), Some(path));

        match (action, local) {
            (SyncAction::CreateRemote | SyncAction::UpdateRemote, _) => {
                self.upload(session, local, path).await
            }
            (SyncAction::NoteConflict, Item::Note(note)) => {
                self.resolve_note_conflict(session, note, remote).await
            }
            _ => self.resolve_item_conflict(session, local, remote).await,
        }
    }

    /// Read and parse the remote copy of an item, if there is one.
    pub(super) async fn load_remote(&self, path: &str) -> Result<Option<Item>> {
        if self.api.stat(path).await?.is_none() {
            return Ok(None);
        }
        let Some(content) = self.api.get(path).await? else {
            return Ok(None);
        };
        let content = String::from_utf8(content)
            .map_err(|error| Error::Unserialize(format!("{path} is not valid UTF-8: {error}")))?;
        Item::unserialize(&content).map(Some)
    }

    async fn upload(&self, session: &Session, local: &Item, path: &str) -> Result<()> {
        let sync_target = session.sync_target;

        if let Item::Resource(resource) = local {
            let blob = self
                .db
                .resource_blob(&resource.id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("content of resource {}", resource.id)))?;
            self.api.put(&resource_path(&resource.id), &blob).await?;
        }

        let content = local.serialize_for_sync(self.encryption())?;
        match self.put_metadata(session, path, &content).await {
            Ok(()) => {}
            Err(Error::CannotSync(reason)) => {
                tracing::warn!("Target refused {path}, it will not be synced again: {reason}");
                return self
                    .db
                    .with_connection(|conn| {
                        SqliteSyncRepository::new(conn).mark_sync_disabled(
                            sync_target,
                            local.item_type(),
                            &local.id(),
                            &reason,
                        )
                    })
                    .await;
            }
            Err(error) => return Err(error),
        }

        self.api.set_timestamp(path, local.updated_time()).await?;
        self.inject(session, FaultPoint::BeforeMarkSynced, path)?;

        let now = unix_ms_now();
        self.db
            .transaction(|conn| {
                SqliteSyncRepository::new(conn).mark_synced(
                    sync_target,
                    local.item_type(),
                    &local.id(),
                    now,
                )
            })
            .await
    }

    async fn put_metadata(&self, session: &Session, path: &str, content: &str) -> Result<()> {
        self.inject(session, FaultPoint::BeforeRemotePut, path)?;
        self.inject(session, FaultPoint::RejectItemPush, path)?;
        self.api.put(path, content.as_bytes()).await
    }

    /// Keep the local edits as a conflict copy, then let the remote win.
    async fn resolve_note_conflict(
        &self,
        session: &Session,
        local: &Note,
        remote: Option<Item>,
    ) -> Result<()> {
        let must_copy = match &remote {
            Some(Item::Note(remote)) => local.must_handle_conflict(remote),
            _ => true,
        };
        let sync_target = session.sync_target;
        let now = unix_ms_now();

        self.db
            .transaction(|conn| {
                let items = SqliteItemRepository::new(conn);
                if must_copy {
                    let copy = local.conflict_copy();
                    tracing::info!("Saved conflict copy {} of note {}", copy.id, local.id);
                    items.save(&copy.into())?;
                }
                match &remote {
                    Some(remote) => {
                        items.save(remote)?;
                        SqliteSyncRepository::new(conn).mark_synced(
                            sync_target,
                            remote.item_type(),
                            &remote.id(),
                            now,
                        )
                    }
                    None => items.delete(ItemType::Note, &local.id, false),
                }
            })
            .await
    }

    /// Remote wins for every item type other than notes.
    async fn resolve_item_conflict(
        &self,
        session: &Session,
        local: &Item,
        remote: Option<Item>,
    ) -> Result<()> {
        let sync_target = session.sync_target;
        let now = unix_ms_now();

        let Some(remote) = remote else {
            return self
                .db
                .transaction(|conn| {
                    if local.item_type() == ItemType::Folder {
                        let deleted = remove_local_folder(conn, &local.id())?;
                        if !deleted {
                            SqliteSyncRepository::new(conn).mark_synced(
                                sync_target,
                                ItemType::Folder,
                                &local.id(),
                                now,
                            )?;
                        }
                        return Ok(());
                    }
                    SqliteItemRepository::new(conn).delete(local.item_type(), &local.id(), false)
                })
                .await;
        };

        let blob = match &remote {
            Item::Resource(resource) => Some(self.download_blob(&resource.id).await?),
            _ => None,
        };

        self.db
            .transaction(|conn| {
                let items = SqliteItemRepository::new(conn);
                items.save(&remote)?;
                if let Some(blob) = &blob {
                    items.set_resource_blob(&remote.id(), blob)?;
                }
                SqliteSyncRepository::new(conn).mark_synced(
                    sync_target,
                    remote.item_type(),
                    &remote.id(),
                    now,
                )
            })
            .await
    }
}
