//! Deletion phase: propagate the local deletion ledger.

use crate::db::{DeletedItem, SqliteSyncRepository, SyncMetadataStore};
use crate::error::Result;
use crate::file_api::{resource_path, system_path};
use crate::models::ItemType;

use super::session::Session;
use super::{FaultPoint, SyncAction, Synchronizer};

impl Synchronizer {
    pub(super) async fn delete_remote_items(&self, session: &mut Session) -> Result<()> {
        let sync_target = session.sync_target;
        let deleted = self
            .db
            .with_connection(|conn| SqliteSyncRepository::new(conn).deleted_items(sync_target))
            .await?;

        for entry in &deleted {
            if session.is_cancelled() {
                break;
            }

            let path = system_path(&entry.item_id);
            session.log_operation(
                SyncAction::DeleteRemote,
                "local has been deleted",
                Some(entry.item_type),
                None,
                Some(path.as_str()),
            );

            // The entry stays in the ledger until the remote side is gone.
            if let Err(error) = self.delete_remote_item(session, entry, &path).await {
                if error.is_fatal() {
                    return Err(error);
                }
                session.record_error(Some(entry.item_id), Some(path.as_str()), &error);
            }
        }

        Ok(())
    }

    async fn delete_remote_item(&self, session: &Session, entry: &DeletedItem, path: &str) -> Result<()> {
        self.inject(session, FaultPoint::DeleteRemote, path)?;
        self.api.delete(path).await?;
        if entry.item_type == ItemType::Resource {
            self.api.delete(&resource_path(&entry.item_id)).await?;
        }

        self.db
            .with_connection(|conn| {
                SqliteSyncRepository::new(conn).remove_ledger_entry(entry.sync_target, &entry.item_id)
            })
            .await
    }
}
