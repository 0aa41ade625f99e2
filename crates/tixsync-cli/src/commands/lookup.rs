use std::path::Path;

use crate::commands::common::{format_record_lines, open_database};
use crate::error::CliError;

pub async fn run_lookup(
    key: &str,
    resource: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::EmptyLookupKey);
    }

    let db = open_database(db_path)?;
    let records = db.find_by_lookup_key(resource, key).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No {resource} record for {key}");
        return Ok(());
    }

    for line in format_record_lines(&records) {
        println!("{line}");
    }
    Ok(())
}
