//! Resumable sync context.

use serde::{Deserialize, Serialize};

/// State carried from one sync run to the next.
///
/// The caller persists it between runs (the CLI keeps it in the settings
/// table) and passes it back to [`Synchronizer::start`](super::Synchronizer::start).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncContext {
    /// Opaque cursor of the remote change source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<serde_json::Value>,
}

impl SyncContext {
    /// Settings key under which clients store the context of a target.
    pub fn settings_key(sync_target: u32) -> String {
        format!("sync.context.{sync_target}")
    }
}
