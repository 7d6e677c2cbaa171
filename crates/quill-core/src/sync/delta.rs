//! Sources of remote changes for the pull phase.
//!
//! [`NativeDelta`] forwards to the backend's own delta API. [`BasicDelta`]
//! emulates one on top of a directory listing by comparing modification
//! times and the set of locally known items.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::{SqliteSyncRepository, SyncMetadataStore};
use crate::error::{Error, Result};
use crate::file_api::{id_from_system_path, is_system_path, DeltaPage, FileApi, RemoteStat, SYNC_DIR};
use crate::services::DatabaseService;

/// A paged feed of changes under the sync directory.
///
/// Paths in returned pages are file names relative to [`SYNC_DIR`].
#[async_trait]
pub trait RemoteChangeSource: Send + Sync {
    async fn next_page(&self, context: Option<&serde_json::Value>) -> Result<DeltaPage>;

    /// Turn a position that will be replayed into one the next run can start from.
    ///
    /// Sources that snapshot the remote inside their context drop the
    /// snapshot here, so a replay always works from fresh data.
    fn rewind(&self, context: Option<serde_json::Value>) -> Option<serde_json::Value> {
        context
    }
}

/// Changes reported by the backend itself.
pub struct NativeDelta {
    api: Arc<dyn FileApi>,
}

impl NativeDelta {
    pub fn new(api: Arc<dyn FileApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl RemoteChangeSource for NativeDelta {
    async fn next_page(&self, context: Option<&serde_json::Value>) -> Result<DeltaPage> {
        self.api.delta(SYNC_DIR, context).await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BasicDeltaContext {
    /// Most recent modification time seen so far
    #[serde(default)]
    timestamp: i64,
    /// Files modified exactly at `timestamp` that were already reported
    #[serde(default)]
    files_at_timestamp: Vec<String>,
    /// Listing taken at the start of a pass, kept until the pass is done
    #[serde(default)]
    stats_cache: Option<Vec<RemoteStat>>,
    /// Items known locally but missing remotely, still to be reported
    #[serde(default)]
    pending_deletions: VecDeque<String>,
}

/// Delta emulation for backends that can only list a directory.
pub struct BasicDelta {
    api: Arc<dyn FileApi>,
    db: DatabaseService,
    sync_target: u32,
    page_size: usize,
    wipe_out_fail_safe: bool,
}

impl BasicDelta {
    pub fn new(
        api: Arc<dyn FileApi>,
        db: DatabaseService,
        sync_target: u32,
        page_size: usize,
        wipe_out_fail_safe: bool,
    ) -> Self {
        Self {
            api,
            db,
            sync_target,
            page_size: page_size.max(1),
            wipe_out_fail_safe,
        }
    }

    /// Take a fresh listing and work out which synced items disappeared.
    async fn start_pass(&self, context: &mut BasicDeltaContext) -> Result<()> {
        let mut stats: Vec<RemoteStat> = self
            .api
            .list(SYNC_DIR)
            .await?
            .into_iter()
            .filter(|stat| !stat.is_dir && is_system_path(&stat.path))
            .collect();
        stats.sort_by(|a, b| {
            a.updated_time
                .cmp(&b.updated_time)
                .then_with(|| a.path.cmp(&b.path))
        });

        let synced_ids = self
            .db
            .with_connection(|conn| SqliteSyncRepository::new(conn).synced_item_ids(self.sync_target))
            .await?;

        if self.wipe_out_fail_safe && stats.is_empty() && !synced_ids.is_empty() {
            return Err(Error::FailSafe(format!(
                "the sync target is empty but {} items were previously synced with it; \
                 refusing to delete them locally",
                synced_ids.len()
            )));
        }

        let remote_ids: HashSet<_> = stats
            .iter()
            .filter_map(|stat| id_from_system_path(&stat.path))
            .collect();
        context.pending_deletions = synced_ids
            .into_iter()
            .filter(|id| !remote_ids.contains(id))
            .map(|id| format!("{id}.md"))
            .collect();
        context.stats_cache = Some(stats);
        Ok(())
    }
}

#[async_trait]
impl RemoteChangeSource for BasicDelta {
    async fn next_page(&self, context: Option<&serde_json::Value>) -> Result<DeltaPage> {
        let mut context: BasicDeltaContext = match context {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|error| {
                tracing::warn!("Ignoring unreadable delta context: {error}");
                BasicDeltaContext::default()
            }),
            None => BasicDeltaContext::default(),
        };

        if context.stats_cache.is_none() {
            self.start_pass(&mut context).await?;
        }

        let previous_timestamp = context.timestamp;
        let previous_files: HashSet<String> = context.files_at_timestamp.iter().cloned().collect();
        let mut items = Vec::new();

        for stat in context.stats_cache.iter().flatten() {
            if items.len() >= self.page_size {
                break;
            }
            if stat.updated_time < previous_timestamp {
                continue;
            }
            if stat.updated_time == previous_timestamp && previous_files.contains(&stat.path) {
                continue;
            }
            if stat.updated_time > context.timestamp {
                context.timestamp = stat.updated_time;
                context.files_at_timestamp.clear();
            }
            context.files_at_timestamp.push(stat.path.clone());
            items.push(stat.clone());
        }

        while items.len() < self.page_size {
            let Some(path) = context.pending_deletions.pop_front() else {
                break;
            };
            items.push(RemoteStat {
                path,
                updated_time: 0,
                is_dir: false,
                is_deleted: true,
            });
        }

        let has_more = items.len() >= self.page_size;
        if !has_more {
            context.stats_cache = None;
            context.pending_deletions.clear();
        }

        Ok(DeltaPage {
            items,
            has_more,
            context: Some(serde_json::to_value(&context)?),
        })
    }

    fn rewind(&self, context: Option<serde_json::Value>) -> Option<serde_json::Value> {
        let mut context: BasicDeltaContext = serde_json::from_value(context?).ok()?;
        context.stats_cache = None;
        context.pending_deletions.clear();
        serde_json::to_value(&context).ok()
    }
}
