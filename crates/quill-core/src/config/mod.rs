//! Synchronizer configuration.
//!
//! `SyncConfig` is plain data so clients can keep it next to their own
//! settings (JSON file, settings table, command-line flags).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_SYNC_TARGET: u32 = 1;
const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_BASIC_DELTA_PAGE_SIZE: usize = 1000;

/// Tunables for a [`Synchronizer`](crate::sync::Synchronizer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Backend identifier; sync metadata is kept per target.
    #[serde(default = "default_sync_target")]
    pub sync_target: u32,
    /// Number of dirty items fetched per push page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Refuse to delete every local item when the remote listing comes back empty.
    #[serde(default = "default_wipe_out_fail_safe")]
    pub wipe_out_fail_safe: bool,
    /// Number of items returned per page by the full-scan delta.
    #[serde(default = "default_basic_delta_page_size")]
    pub basic_delta_page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_target: DEFAULT_SYNC_TARGET,
            page_size: DEFAULT_PAGE_SIZE,
            wipe_out_fail_safe: true,
            basic_delta_page_size: DEFAULT_BASIC_DELTA_PAGE_SIZE,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidInput(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if self.basic_delta_page_size == 0 {
            return Err(Error::InvalidInput(
                "basic_delta_page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn with_sync_target(mut self, sync_target: u32) -> Self {
        self.sync_target = sync_target;
        self
    }

    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

const fn default_sync_target() -> u32 {
    DEFAULT_SYNC_TARGET
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

const fn default_wipe_out_fail_safe() -> bool {
    true
}

const fn default_basic_delta_page_size() -> usize {
    DEFAULT_BASIC_DELTA_PAGE_SIZE
}
