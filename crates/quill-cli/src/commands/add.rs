use std::path::Path;

use crate::commands::common::{normalize_content, open_database, read_piped_stdin, resolve_folder};
use crate::error::CliError;

pub async fn run_add(
    title_parts: &[String],
    body: Option<String>,
    folder: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let title = normalize_content(&title_parts.join(" ")).ok_or(CliError::EmptyTitle)?;
    let body = match body {
        Some(body) => body,
        None => read_piped_stdin()?.unwrap_or_default(),
    };

    let db = open_database(db_path).await?;
    let parent_id = match folder {
        Some(query) => Some(resolve_folder(query, &db).await?.id),
        None => None,
    };
    let note = db.create_note(parent_id, &title, &body).await?;

    println!("{}", note.id);
    Ok(())
}
