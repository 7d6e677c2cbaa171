//! File API driver for a plain directory.
//!
//! Every remote path maps to a file below the root. The directory has no
//! change feed, so the synchronizer falls back to full listings.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use quill_core::file_api::{DeltaPage, FileApi, RemoteStat};
use quill_core::{Error, Result};

pub struct FileSystemFileApi {
    root: PathBuf,
}

impl FileSystemFileApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |full, part| full.join(part))
    }
}

fn storage_error(action: &str, path: &str, error: &io::Error) -> Error {
    Error::Storage(format!("Failed to {action} {path}: {error}"))
}

fn modified_ms(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .and_then(|duration| i64::try_from(duration.as_millis()).ok())
        .unwrap_or(0)
}

fn is_not_found(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::NotFound
}

fn set_modified(path: &Path, timestamp_ms: i64) -> io::Result<()> {
    let millis = u64::try_from(timestamp_ms).unwrap_or(0);
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(UNIX_EPOCH + Duration::from_millis(millis))
}

#[async_trait]
impl FileApi for FileSystemFileApi {
    async fn mkdir(&self, path: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.full_path(path))
            .await
            .map_err(|e| storage_error("create directory", path, &e))
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteStat>> {
        match tokio::fs::metadata(self.full_path(path)).await {
            Ok(metadata) => Ok(Some(RemoteStat {
                path: path.to_string(),
                updated_time: modified_ms(&metadata),
                is_dir: metadata.is_dir(),
                is_deleted: false,
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(storage_error("stat", path, &e)),
        }
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.full_path(path)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(storage_error("read", path, &e)),
        }
    }

    async fn put(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create directory for", path, &e))?;
        }
        tokio::fs::write(&full_path, content)
            .await
            .map_err(|e| storage_error("write", path, &e))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.full_path(path)).await {
            Err(e) if !is_not_found(&e) => Err(storage_error("delete", path, &e)),
            _ => Ok(()),
        }
    }

    async fn set_timestamp(&self, path: &str, timestamp_ms: i64) -> Result<()> {
        let full_path = self.full_path(path);
        tokio::task::spawn_blocking(move || set_modified(&full_path, timestamp_ms))
            .await
            .map_err(|e| Error::Storage(format!("Timestamp update task failed: {e}")))?
            .map_err(|e| storage_error("set timestamp of", path, &e))
    }

    async fn move_item(&self, old_path: &str, new_path: &str) -> Result<()> {
        tokio::fs::rename(self.full_path(old_path), self.full_path(new_path))
            .await
            .map_err(|e| storage_error("move", old_path, &e))
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteStat>> {
        let mut dir = match tokio::fs::read_dir(self.full_path(path)).await {
            Ok(dir) => dir,
            Err(e) if is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(storage_error("list", path, &e)),
        };

        let mut stats = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| storage_error("list", path, &e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                tracing::debug!("Skipping non UTF-8 entry in {path}");
                continue;
            };
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| storage_error("stat", &name, &e))?;
            stats.push(RemoteStat {
                path: name,
                updated_time: modified_ms(&metadata),
                is_dir: metadata.is_dir(),
                is_deleted: false,
            });
        }
        Ok(stats)
    }

    async fn delta(&self, path: &str, _context: Option<&serde_json::Value>) -> Result<DeltaPage> {
        Err(Error::Storage(format!(
            "Directory targets have no change feed for {path}"
        )))
    }

    fn supports_delta(&self) -> bool {
        false
    }
}
