use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use chrono::Utc;
use quill_core::services::DatabaseService;
use quill_core::util::normalize_text_option;
use quill_core::{Folder, Item, ItemId, ItemType, Note};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub folder_id: Option<String>,
    pub title: String,
    pub body: String,
    pub is_conflict: bool,
    pub encrypted: bool,
    pub created_time: i64,
    pub updated_time: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct FolderListItem {
    pub id: String,
    pub title: String,
    pub updated_time: i64,
}

pub async fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path.to_path_buf()).await?)
}

pub async fn list_notes(db: &DatabaseService) -> Result<Vec<Note>, CliError> {
    let mut notes: Vec<Note> = db
        .list_items(ItemType::Note)
        .await?
        .into_iter()
        .filter_map(|item| match item {
            Item::Note(note) => Some(note),
            _ => None,
        })
        .collect();
    notes.sort_by(|a, b| b.updated_time.cmp(&a.updated_time));
    Ok(notes)
}

pub async fn list_folders(db: &DatabaseService) -> Result<Vec<Folder>, CliError> {
    let mut folders: Vec<Folder> = db
        .list_items(ItemType::Folder)
        .await?
        .into_iter()
        .filter_map(|item| match item {
            Item::Folder(folder) => Some(folder),
            _ => None,
        })
        .collect();
    folders.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
    Ok(folders)
}

/// Resolve a full ID or a unique ID prefix among notes and folders.
pub async fn resolve_item(query: &str, db: &DatabaseService) -> Result<Item, CliError> {
    let query = normalize_item_identifier(query)?;

    if let Ok(id) = query.parse::<ItemId>() {
        if let Some(item) = db.load_item(&id).await? {
            return Ok(item);
        }
    }

    let prefix = query.to_lowercase();
    let mut matches = Vec::new();
    for item_type in [ItemType::Folder, ItemType::Note] {
        matches.extend(
            db.list_items(item_type)
                .await?
                .into_iter()
                .filter(|item| item.id().as_str().starts_with(&prefix)),
        );
    }

    match matches.len() {
        0 => Err(CliError::ItemNotFound(query)),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|item| short_id(&item.id()))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousItemId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub async fn resolve_folder(query: &str, db: &DatabaseService) -> Result<Folder, CliError> {
    match resolve_item(query, db).await? {
        Item::Folder(folder) => Ok(folder),
        other => Err(CliError::NotAFolder(
            other.id().to_string(),
            other.item_type().name().to_lowercase(),
        )),
    }
}

pub fn short_id(id: &ItemId) -> String {
    id.as_str().chars().take(12).collect()
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_time, now_ms);
            let marker = if note.is_conflict { "  [conflict]" } else { "" };
            format!(
                "{:<12}  {preview:<40}  {relative_time}{marker}",
                short_id(&note.id)
            )
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        id: note.id.to_string(),
        folder_id: note.parent_id.map(|id| id.to_string()),
        title: note.title.clone(),
        body: note.body.clone(),
        is_conflict: note.is_conflict,
        encrypted: note.encryption_applied,
        created_time: note.created_time,
        updated_time: note.updated_time,
        relative_time: format_relative_time(note.updated_time, now_ms),
    }
}

pub fn folder_to_list_item(folder: &Folder) -> FolderListItem {
    FolderListItem {
        id: folder.id.to_string(),
        title: folder.title.clone(),
        updated_time: folder.updated_time,
    }
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    if note.encryption_applied {
        return "(encrypted)".to_string();
    }
    let source = if note.title.trim().is_empty() {
        note.body.lines().next().unwrap_or("")
    } else {
        note.title.as_str()
    };
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_item_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyItemId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("QUILL_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
        .join("quill.db")
}

pub fn resolve_sync_dir(cli_target: Option<PathBuf>) -> Option<PathBuf> {
    cli_target.or_else(|| normalize_text_option(env::var("QUILL_SYNC_DIR").ok()).map(PathBuf::from))
}
