//! In-memory File API driver.
//!
//! Keeps every entry in a map and records changes in a sequence-numbered log,
//! so `delta` is exact regardless of timestamps. Used by tests and as the
//! reference implementation of the contract.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::unix_ms_now;

use super::{DeltaPage, FileApi, RemoteStat};

const DEFAULT_DELTA_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone)]
struct Entry {
    content: Vec<u8>,
    updated_time: i64,
    is_dir: bool,
}

#[derive(Debug, Clone, Copy)]
struct Change {
    seq: u64,
    updated_time: i64,
    is_deleted: bool,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    /// Latest change per path
    changes: BTreeMap<String, Change>,
    next_seq: u64,
}

impl State {
    fn record(&mut self, path: &str, updated_time: i64, is_deleted: bool) {
        self.next_seq += 1;
        self.changes.insert(
            path.to_string(),
            Change {
                seq: self.next_seq,
                updated_time,
                is_deleted,
            },
        );
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DeltaCursor {
    seq: u64,
}

/// File API backed by process memory.
#[derive(Debug)]
pub struct MemoryFileApi {
    state: Mutex<State>,
    delta_page_size: usize,
    supports_delta: bool,
}

impl Default for MemoryFileApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            delta_page_size: DEFAULT_DELTA_PAGE_SIZE,
            supports_delta: true,
        }
    }

    /// Limit the number of entries returned per `delta` page.
    #[must_use]
    pub fn with_delta_page_size(mut self, page_size: usize) -> Self {
        self.delta_page_size = page_size.max(1);
        self
    }

    /// Report no native delta, so clients fall back to a full scan.
    #[must_use]
    pub const fn without_delta(mut self) -> Self {
        self.supports_delta = false;
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Storage("memory file api state poisoned".to_string()))
    }
}

/// Name of `path` relative to `dir`, when it is a direct child.
fn child_name<'a>(dir: &str, path: &'a str) -> Option<&'a str> {
    let dir = dir.trim_end_matches('/');
    let name = if dir.is_empty() {
        path
    } else {
        path.strip_prefix(dir)?.strip_prefix('/')?
    };
    (!name.is_empty() && !name.contains('/')).then_some(name)
}

#[async_trait]
impl FileApi for MemoryFileApi {
    async fn mkdir(&self, path: &str) -> Result<()> {
        let mut state = self.state()?;
        state.entries.entry(path.to_string()).or_insert(Entry {
            content: Vec::new(),
            updated_time: unix_ms_now(),
            is_dir: true,
        });
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteStat>> {
        let state = self.state()?;
        Ok(state.entries.get(path).map(|entry| RemoteStat {
            path: path.to_string(),
            updated_time: entry.updated_time,
            is_dir: entry.is_dir,
            is_deleted: false,
        }))
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state()?;
        Ok(state
            .entries
            .get(path)
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.content.clone()))
    }

    async fn put(&self, path: &str, content: &[u8]) -> Result<()> {
        let mut state = self.state()?;
        let now = unix_ms_now();
        state.entries.insert(
            path.to_string(),
            Entry {
                content: content.to_vec(),
                updated_time: now,
                is_dir: false,
            },
        );
        state.record(path, now, false);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.state()?;
        if state.entries.remove(path).is_some() {
            state.record(path, unix_ms_now(), true);
        }
        Ok(())
    }

    async fn set_timestamp(&self, path: &str, timestamp_ms: i64) -> Result<()> {
        let mut state = self.state()?;
        let entry = state
            .entries
            .get_mut(path)
            .ok_or_else(|| Error::Storage(format!("no such remote entry: {path}")))?;
        entry.updated_time = timestamp_ms;
        state.record(path, timestamp_ms, false);
        Ok(())
    }

    async fn move_item(&self, old_path: &str, new_path: &str) -> Result<()> {
        let mut state = self.state()?;
        let entry = state
            .entries
            .remove(old_path)
            .ok_or_else(|| Error::Storage(format!("no such remote entry: {old_path}")))?;
        let updated_time = entry.updated_time;
        state.entries.insert(new_path.to_string(), entry);
        state.record(old_path, unix_ms_now(), true);
        state.record(new_path, updated_time, false);
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteStat>> {
        let state = self.state()?;
        Ok(state
            .entries
            .iter()
            .filter_map(|(entry_path, entry)| {
                child_name(path, entry_path).map(|name| RemoteStat {
                    path: name.to_string(),
                    updated_time: entry.updated_time,
                    is_dir: entry.is_dir,
                    is_deleted: false,
                })
            })
            .collect())
    }

    async fn delta(&self, path: &str, context: Option<&serde_json::Value>) -> Result<DeltaPage> {
        let cursor: DeltaCursor = context
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()?
            .unwrap_or_default();

        let state = self.state()?;
        let mut changes: Vec<(&str, Change)> = state
            .changes
            .iter()
            .filter(|(_, change)| change.seq > cursor.seq)
            .filter_map(|(change_path, change)| {
                child_name(path, change_path).map(|name| (name, *change))
            })
            .collect();
        changes.sort_by_key(|(_, change)| change.seq);

        let has_more = changes.len() > self.delta_page_size;
        changes.truncate(self.delta_page_size);

        let last_seq = changes.last().map_or(cursor.seq, |(_, change)| change.seq);
        let items = changes
            .into_iter()
            .map(|(name, change)| RemoteStat {
                path: name.to_string(),
                updated_time: change.updated_time,
                is_dir: false,
                is_deleted: change.is_deleted,
            })
            .collect();

        Ok(DeltaPage {
            items,
            has_more,
            context: Some(serde_json::to_value(DeltaCursor { seq: last_seq })?),
        })
    }

    fn supports_delta(&self) -> bool {
        self.supports_delta
    }
}
