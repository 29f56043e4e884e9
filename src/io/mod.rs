//! Reading record batches and writing exported entries.
//!
//! # Supported Formats
//!
//! | Format | Records | Identifiers | Export | Notes |
//! |--------|---------|-------------|--------|-------|
//! | CSL-JSON | ✓ | ✓ | ✓ | Array, single object or NDJSON; string arrays for identifiers |
//! | CSL-YAML | ✓ | - | ✓ | Sequence, `references:` block or document stream |
//! | BibTeX | ✓ | - | - | Converted to CSL-JSON on read |
//! | Text | - | ✓ | - | One identifier per line, `#` comments |
//! | CSV | - | ✓ | - | `doi`/`identifier`/`id` column |

pub mod formats;
pub mod traits;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::Value;

pub use formats::Format;
pub use traits::{ExportSink, ImportSource, read_all};

use crate::{Error, Result};

/// Reads every raw record of a file, detecting its format from the
/// extension.
///
/// Broken entries are logged and skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is not a record format.
pub fn read_record_file(path: &Path) -> Result<Vec<Value>> {
    let format = Format::from_path(path)?;
    let origin = path.display().to_string();
    let reader = BufReader::new(open(path)?);
    let mut source = formats::create_import_source(reader, format, &origin)?;
    read_all(source.as_mut(), &origin)
}

/// Reads an identifier list file, detecting its format from the extension.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the list is malformed.
pub fn read_identifier_file(path: &Path, source_name: &str) -> Result<Vec<String>> {
    let format = Format::from_path(path)?;
    formats::read_identifiers(BufReader::new(open(path)?), format, source_name)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::OperationFailed {
        operation: "open_input".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}
