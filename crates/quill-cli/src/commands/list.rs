use std::path::Path;

use quill_core::services::DatabaseService;
use quill_core::Note;

use crate::commands::common::{
    format_note_lines, list_notes, note_to_list_item, open_database, resolve_folder, NoteListItem,
};
use crate::error::CliError;

#[derive(Debug, Default)]
pub struct ListFilter {
    pub folder: Option<String>,
    pub conflicts_only: bool,
    pub limit: usize,
}

pub async fn filtered_notes(filter: &ListFilter, db: &DatabaseService) -> Result<Vec<Note>, CliError> {
    let folder_id = match filter.folder.as_deref() {
        Some(query) => Some(resolve_folder(query, db).await?.id),
        None => None,
    };

    Ok(list_notes(db)
        .await?
        .into_iter()
        .filter(|note| folder_id.is_none() || note.parent_id == folder_id)
        .filter(|note| !filter.conflicts_only || note.is_conflict)
        .take(filter.limit)
        .collect())
}

pub async fn run_list(filter: &ListFilter, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let notes = filtered_notes(filter, &db).await?;

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
