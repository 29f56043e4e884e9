//! CSV identifier lists.
//!
//! The first row holds headers; one column (`doi`, `identifier` or `id`)
//! carries the identifiers. Other columns are ignored.

use std::io::Read;

use crate::io::traits::io_error;
use crate::{Error, Result};

const IDENTIFIER_COLUMNS: [&str; 4] = ["doi", "identifier", "id", "doi_url"];

/// Reads identifiers from a CSV document.
///
/// Empty cells are skipped.
///
/// # Errors
///
/// Returns [`Error::InvalidItemType`] if no identifier column exists and
/// [`Error::OperationFailed`] on malformed CSV.
pub fn read_csv_identifiers<R: Read>(reader: R, source_name: &str) -> Result<Vec<String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| io_error("read_csv_headers", e))?
        .clone();
    let column = headers
        .iter()
        .position(|h| IDENTIFIER_COLUMNS.contains(&h.to_lowercase().as_str()))
        .ok_or_else(|| Error::InvalidItemType {
            source_name: source_name.to_string(),
            detail: format!(
                "CSV must have one of the columns {}",
                IDENTIFIER_COLUMNS.join(", ")
            ),
        })?;

    let mut identifiers = Vec::new();
    for row in csv_reader.records() {
        let row = row.map_err(|e| io_error("read_csv_row", e))?;
        if let Some(value) = row.get(column).filter(|v| !v.is_empty()) {
            identifiers.push(value.to_string());
        }
    }
    Ok(identifiers)
}
