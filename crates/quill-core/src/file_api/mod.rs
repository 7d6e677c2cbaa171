//! Remote storage contract and the layout of a sync target.
//!
//! A sync target is a flat store of named blobs. Item metadata lives under
//! [`SYNC_DIR`] as `<id>.md`, resource content under [`RESOURCE_DIR`] as
//! `<id>`. Drivers implement [`FileApi`]; paths are relative to the target
//! root and use `/` as separator.

mod memory;

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ItemId;

pub use memory::MemoryFileApi;

/// Directory holding serialized item metadata.
pub const SYNC_DIR: &str = ".sync";
/// Directory holding resource blobs.
pub const RESOURCE_DIR: &str = ".resource";

/// Remote metadata path of an item.
pub fn system_path(id: &ItemId) -> String {
    format!("{SYNC_DIR}/{id}.md")
}

/// Remote blob path of a resource.
pub fn resource_path(id: &ItemId) -> String {
    format!("{RESOURCE_DIR}/{id}")
}

/// Whether a file name (relative to [`SYNC_DIR`]) is item metadata.
pub fn is_system_path(name: &str) -> bool {
    static SYSTEM_PATH: OnceLock<Regex> = OnceLock::new();
    SYSTEM_PATH
        .get_or_init(|| Regex::new(r"^[0-9a-fA-F]{32}\.md$").expect("Invalid regex"))
        .is_match(name)
}

/// Item ID encoded in a metadata file name.
pub fn id_from_system_path(name: &str) -> Option<ItemId> {
    if !is_system_path(name) {
        return None;
    }
    name.strip_suffix(".md")?.parse().ok()
}

/// Metadata about a remote entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStat {
    /// Path relative to the listed directory
    pub path: String,
    /// Modification time in Unix ms
    pub updated_time: i64,
    pub is_dir: bool,
    /// Only set on delta entries for removed files
    #[serde(default)]
    pub is_deleted: bool,
}

/// One page of remote changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaPage {
    pub items: Vec<RemoteStat>,
    pub has_more: bool,
    /// Opaque cursor to pass to the next call
    pub context: Option<serde_json::Value>,
}

/// Remote storage operations the synchronizer relies on.
///
/// Missing entries are not errors: `stat` and `get` return `None`, `delete`
/// succeeds. Failures are reported as [`Error::Storage`](crate::Error::Storage);
/// a driver that permanently refuses an item returns
/// [`Error::CannotSync`](crate::Error::CannotSync) from `put`.
#[async_trait]
pub trait FileApi: Send + Sync {
    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn stat(&self, path: &str) -> Result<Option<RemoteStat>>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, path: &str, content: &[u8]) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Set the modification time reported by `stat`, `list` and `delta`.
    async fn set_timestamp(&self, path: &str, timestamp_ms: i64) -> Result<()>;

    async fn move_item(&self, old_path: &str, new_path: &str) -> Result<()>;

    /// Direct children of a directory, with paths relative to it.
    async fn list(&self, path: &str) -> Result<Vec<RemoteStat>>;

    /// Changes under a directory since `context`, with paths relative to it.
    async fn delta(&self, path: &str, context: Option<&serde_json::Value>) -> Result<DeltaPage>;

    /// Whether `delta` is backed by the storage itself.
    fn supports_delta(&self) -> bool;
}
