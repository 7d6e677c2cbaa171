//! Error types for quill-core

use thiserror::Error;

/// Result type alias using quill-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in quill-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Item not found
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A serialized item could not be parsed back
    #[error("Cannot unserialize item: {0}")]
    Unserialize(String),

    /// Remote storage (File API) error
    #[error("Storage error: {0}")]
    Storage(String),

    /// The sync target permanently refused an item
    #[error("Item cannot be synced: {0}")]
    CannotSync(String),

    /// Encryption service error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// A sync session is already running for this store and backend
    #[error("Synchronisation is already in progress")]
    AlreadyInProgress,

    /// The push pagination returned a path that was already handled in this pass
    #[error("Processing a path that has already been done: {0}. sync_time was not updated?")]
    PathProcessedTwice(String),

    /// The wipe-out fail-safe refused to delete local data
    #[error("Fail-safe: {0}")]
    FailSafe(String),
}

impl Error {
    /// Whether this error must abort the whole sync run instead of a single item.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PathProcessedTwice(_) | Self::FailSafe(_) | Self::Database(_) | Self::Sqlite(_)
        )
    }
}
