//! Shared sync session state.

use serde::{Deserialize, Serialize};

/// Lifecycle of a sync session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    InProgress,
}
