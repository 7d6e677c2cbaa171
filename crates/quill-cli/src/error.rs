use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] quill_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note title provided")]
    EmptyTitle,
    #[error("Item ID cannot be empty")]
    EmptyItemId,
    #[error("Item not found for id/prefix: {0}")]
    ItemNotFound(String),
    #[error("{0}")]
    AmbiguousItemId(String),
    #[error("Expected a folder but {0} is a {1}")]
    NotAFolder(String, String),
    #[error("No sync target. Pass `--target <DIR>` or set QUILL_SYNC_DIR.")]
    SyncNotConfigured,
}
