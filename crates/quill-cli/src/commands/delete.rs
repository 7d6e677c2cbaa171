use std::path::Path;

use crate::commands::common::{open_database, resolve_item};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let item = resolve_item(id, &db).await?;

    db.delete_item(&item.id()).await?;
    println!("{}", item.id());
    Ok(())
}
