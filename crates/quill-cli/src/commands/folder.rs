use std::path::Path;

use crate::commands::common::{folder_to_list_item, list_folders, normalize_content, open_database, short_id};
use crate::error::CliError;

pub async fn run_folder_add(title_parts: &[String], db_path: &Path) -> Result<(), CliError> {
    let title = normalize_content(&title_parts.join(" ")).ok_or(CliError::EmptyTitle)?;

    let db = open_database(db_path).await?;
    let folder = db.create_folder(&title).await?;

    println!("{}", folder.id);
    Ok(())
}

pub async fn run_folder_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let folders = list_folders(&db).await?;

    if as_json {
        let items = folders.iter().map(folder_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for folder in &folders {
            println!("{:<12}  {}", short_id(&folder.id), folder.title);
        }
    }
    Ok(())
}
