//! Pull phase: apply remote changes locally.

use rusqlite::Connection;
use serde_json::Value;

use crate::db::{ItemRepository, SqliteItemRepository, SqliteSyncRepository, SyncMetadataStore};
use crate::error::{Error, Result};
use crate::file_api::{id_from_system_path, resource_path, RemoteStat, SYNC_DIR};
use crate::models::{Item, ItemId, ItemType};
use crate::util::unix_ms_now;

use super::context::SyncContext;
use super::delta::{BasicDelta, NativeDelta, RemoteChangeSource};
use super::session::Session;
use super::{FaultPoint, SyncAction, Synchronizer};

/// What applying one remote change did.
enum Applied {
    Done,
    /// A folder deletion postponed until the end of the pull
    DeferredFolder(ItemId),
}

/// Delta position to hand back to the caller.
///
/// Pages are committed as they complete. A page with a failed item, or one
/// that deferred a folder deletion, pins the output to the position before
/// it so those changes are seen again on the next run.
#[derive(Default)]
struct PullCursor {
    committed: Option<Value>,
    page: usize,
    failed: Option<(usize, Option<Value>)>,
    deferred: Option<(usize, Option<Value>)>,
}

impl PullCursor {
    fn new(start: Option<Value>) -> Self {
        Self {
            committed: start,
            ..Self::default()
        }
    }

    fn hold_failed(&mut self) {
        if self.failed.is_none() {
            self.failed = Some((self.page, self.committed.clone()));
        }
    }

    fn hold_deferred(&mut self) {
        if self.deferred.is_none() {
            self.deferred = Some((self.page, self.committed.clone()));
        }
    }

    fn commit(&mut self, next: Option<Value>) {
        if next.is_some() {
            self.committed = next;
        }
        self.page += 1;
    }

    const fn is_held(&self) -> bool {
        self.failed.is_some() || self.deferred.is_some()
    }

    fn output(&self) -> Option<Value> {
        [&self.failed, &self.deferred]
            .into_iter()
            .flatten()
            .min_by_key(|(page, _)| *page)
            .map_or_else(|| self.committed.clone(), |(_, delta)| delta.clone())
    }
}

impl Synchronizer {
    fn change_source(&self, sync_target: u32) -> Box<dyn RemoteChangeSource> {
        if self.api.supports_delta() {
            Box::new(NativeDelta::new(self.api.clone()))
        } else {
            Box::new(BasicDelta::new(
                self.api.clone(),
                self.db.clone(),
                sync_target,
                self.config.basic_delta_page_size,
                self.config.wipe_out_fail_safe,
            ))
        }
    }

    pub(super) async fn pull(&self, session: &mut Session, context: &mut SyncContext) -> Result<()> {
        let sync_target = session.sync_target;
        let source = self.change_source(sync_target);
        let mut cursor = PullCursor::new(context.delta.clone());
        let mut deferred_folders = Vec::new();

        'pages: while !session.is_cancelled() {
            let page = source.next_page(cursor.committed.as_ref()).await?;

            for stat in &page.items {
                let path = format!("{SYNC_DIR}/{}", stat.path);
                let applied = match self.inject(session, FaultPoint::DeltaItem, &path) {
                    Ok(()) => {
                        if session.is_cancelled() {
                            break 'pages;
                        }
                        self.pull_item(session, stat, &path).await
                    }
                    Err(error) => Err(error),
                };

                match applied {
                    Ok(Applied::Done) => {}
                    Ok(Applied::DeferredFolder(id)) => {
                        cursor.hold_deferred();
                        deferred_folders.push(id);
                    }
                    Err(error) if error.is_fatal() => return Err(error),
                    Err(error) => {
                        session.record_error(id_from_system_path(&stat.path), Some(path.as_str()), &error);
                        cursor.hold_failed();
                    }
                }
            }

            cursor.commit(page.context);
            context.delta = resume_point(source.as_ref(), &cursor);
            if !page.has_more {
                break;
            }
        }

        if session.is_cancelled() {
            return Ok(());
        }

        let mut all_removed = true;
        for folder_id in &deferred_folders {
            if let Err(error) = self.db.transaction(|conn| remove_local_folder(conn, folder_id)).await {
                if error.is_fatal() {
                    return Err(error);
                }
                session.record_error(Some(*folder_id), None, &error);
                all_removed = false;
            }
        }
        if all_removed {
            cursor.deferred = None;
        }
        context.delta = resume_point(source.as_ref(), &cursor);

        self.db
            .with_connection(|conn| SqliteSyncRepository::new(conn).delete_orphan_sync_items())
            .await?;
        Ok(())
    }

    async fn pull_item(&self, session: &mut Session, stat: &RemoteStat, path: &str) -> Result<Applied> {
        if stat.is_dir {
            return Ok(Applied::Done);
        }
        let Some(id) = id_from_system_path(&stat.path) else {
            return Ok(Applied::Done);
        };

        let sync_target = session.sync_target;
        let local = self.db.load_item(&id).await?;

        if let Some(local) = &local {
            let sync_time = self
                .db
                .with_connection(|conn| SqliteSyncRepository::new(conn).sync_time(sync_target, &id))
                .await?;
            if sync_time < local.updated_time() {
                // Push resolves it as a conflict on the next run.
                tracing::debug!("Leaving {path} alone: local changes have not been pushed yet");
                return Ok(Applied::Done);
            }
        }

        if stat.is_deleted {
            let Some(local) = local else {
                return Ok(Applied::Done);
            };
            session.log_operation(
                SyncAction::DeleteLocal,
                "remote has been deleted",
                None,
                Some(&local),
                Some(path),
            );
            if local.item_type() == ItemType::Folder {
                return Ok(Applied::DeferredFolder(id));
            }
            self.db
                .transaction(|conn| SqliteItemRepository::new(conn).delete(local.item_type(), &id, false))
                .await?;
            return Ok(Applied::Done);
        }

        let Some(remote) = self.load_remote(path).await? else {
            tracing::debug!("{path} disappeared before it could be read");
            return Ok(Applied::Done);
        };
        if remote.id() != id {
            return Err(Error::Unserialize(format!(
                "{path} contains item {} instead of {id}",
                remote.id()
            )));
        }

        match &local {
            None => {
                let pending = self
                    .db
                    .with_connection(|conn| SqliteSyncRepository::new(conn).is_pending_deletion(sync_target, &id))
                    .await?;
                if pending {
                    tracing::debug!("Not restoring {path}: its local deletion has not been pushed yet");
                    return Ok(Applied::Done);
                }
                session.log_operation(
                    SyncAction::CreateLocal,
                    "remote exists but local does not",
                    None,
                    Some(&remote),
                    Some(path),
                );
            }
            Some(local) if remote.updated_time() > local.updated_time() => {
                session.log_operation(
                    SyncAction::UpdateLocal,
                    "remote is more recent than local",
                    None,
                    Some(local),
                    Some(path),
                );
            }
            Some(_) => return Ok(Applied::Done),
        }

        self.save_pulled(sync_target, &remote).await?;
        Ok(Applied::Done)
    }

    /// Store a remote item verbatim, with its blob, as synced now.
    async fn save_pulled(&self, sync_target: u32, remote: &Item) -> Result<()> {
        let blob = match remote {
            Item::Resource(resource) => Some(self.download_blob(&resource.id).await?),
            _ => None,
        };
        let now = unix_ms_now();

        self.db
            .transaction(|conn| {
                let items = SqliteItemRepository::new(conn);
                items.save(remote)?;
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

    pub(super) async fn download_blob(&self, id: &ItemId) -> Result<Vec<u8>> {
        self.api
            .get(&resource_path(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("remote content of resource {id}")))
    }
}

/// Context to hand back after a page. A held position is rewound by the
/// source so the replay does not reuse a listing taken earlier in the pass.
fn resume_point(source: &dyn RemoteChangeSource, cursor: &PullCursor) -> Option<Value> {
    if cursor.is_held() {
        source.rewind(cursor.output())
    } else {
        cursor.output()
    }
}

/// Delete a folder that is gone remotely, unless it still holds notes.
///
/// A non-empty folder is kept and its notes become conflicts, so nothing the
/// user can see disappears. Returns whether the folder was deleted.
pub(super) fn remove_local_folder(conn: &Connection, folder_id: &ItemId) -> Result<bool> {
    let items = SqliteItemRepository::new(conn);
    let note_ids = items.folder_note_ids(folder_id)?;
    if note_ids.is_empty() {
        items.delete(ItemType::Folder, folder_id, false)?;
        return Ok(true);
    }

    tracing::warn!(
        "Folder {folder_id} was deleted remotely but still contains {} notes; \
         keeping it and marking the notes as conflicts",
        note_ids.len()
    );
    items.mark_notes_as_conflict(&note_ids)?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_advances_per_page() {
        let mut cursor = PullCursor::new(None);
        cursor.commit(Some(json!({"seq": 2})));
        cursor.commit(Some(json!({"seq": 4})));
        assert!(!cursor.is_held());
        assert_eq!(cursor.output(), Some(json!({"seq": 4})));
    }

    #[test]
    fn test_failed_page_pins_output() {
        let mut cursor = PullCursor::new(Some(json!({"seq": 1})));
        cursor.commit(Some(json!({"seq": 2})));
        cursor.hold_failed();
        cursor.commit(Some(json!({"seq": 3})));
        cursor.hold_failed();
        cursor.commit(Some(json!({"seq": 4})));
        assert_eq!(cursor.output(), Some(json!({"seq": 2})));
    }

    #[test]
    fn test_earliest_hold_wins() {
        let mut cursor = PullCursor::new(None);
        cursor.hold_deferred();
        cursor.commit(Some(json!({"seq": 2})));
        cursor.hold_failed();
        cursor.commit(Some(json!({"seq": 3})));
        assert_eq!(cursor.output(), None);

        cursor.deferred = None;
        assert!(cursor.is_held());
        assert_eq!(cursor.output(), Some(json!({"seq": 2})));
    }
}
