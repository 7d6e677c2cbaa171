//! quill-core - Offline-first synchronization engine for Quill
//!
//! This crate contains the item models, the local store, the sync metadata
//! store, the remote File API contract and the synchronizer that reconciles
//! the two.

pub mod config;
pub mod db;
pub mod encryption;
pub mod error;
pub mod file_api;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{Folder, Item, ItemId, ItemType, MasterKey, Note, Resource, Tag};
pub use state::SyncState;
pub use sync::{SyncContext, SyncOptions, SyncOutcome, SyncReport, Synchronizer};
