use std::path::Path;

use crate::cli::{open_db, report_cache};
use crate::error::{BooktallyError, Result};
use crate::importer::import_upload;
use crate::settings::Settings;

pub fn run(file: &str) -> Result<()> {
    let settings = Settings::load();
    let conn = open_db(&settings)?;
    let cache = report_cache(&settings, &conn);

    let path = Path::new(file);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BooktallyError::Other(format!("Not a file: {file}")))?;
    let bytes = std::fs::read(path)?;

    let result = import_upload(&conn, cache.as_ref(), file_name, &bytes)?;

    println!("Import completed successfully.");
    println!(
        "{} rows: {} added, {} updated, {} new categories",
        result.rows, result.created, result.updated, result.categories_created
    );
    Ok(())
}
