use std::path::Path;

use crate::commands::common::open_database;
use crate::error::CliError;

pub async fn run_reset(
    event: Option<&str>,
    resource: Option<&str>,
    all: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    if !all && event.is_none() && resource.is_none() {
        return Err(CliError::Config(
            "Pass --all, --event or --resource to choose which cursors to clear".to_string(),
        ));
    }

    let db = open_database(db_path)?;
    let cleared = db.clear_cursors(event, resource.unwrap_or_default()).await?;
    println!("Cleared {cleared} cursor(s); the next sync refetches them in full");
    Ok(())
}
