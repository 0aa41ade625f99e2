use std::path::Path;

use crate::commands::common::{cursor_to_item, format_cursor_lines, open_database, CursorItem};
use crate::error::CliError;

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let cursors = db.list_cursors().await?;

    if as_json {
        let items = cursors.iter().map(cursor_to_item).collect::<Vec<CursorItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if cursors.is_empty() {
        println!("Nothing synced yet.");
        return Ok(());
    }

    for line in format_cursor_lines(&cursors) {
        println!("{line}");
    }
    Ok(())
}
