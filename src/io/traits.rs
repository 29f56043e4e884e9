//! Core traits for reading record batches and writing entries.
//!
//! Format adapters implement [`ImportSource`] (raw CSL-JSON values, one at a
//! time) and/or [`ExportSink`] (exported entries).

use serde_json::Value;

use crate::models::PublicationEntry;
use crate::{Error, Result};

/// Source of raw records.
///
/// Values are CSL-JSON shaped but unvalidated; turning them into
/// [`crate::models::Record`]s is the caller's job so that a single bad
/// entry only costs that entry.
pub trait ImportSource {
    /// Reads the next raw record.
    ///
    /// Returns `Ok(None)` when the source is exhausted. A recoverable error
    /// ([`Error::is_recoverable`]) affects one entry only; the source can be
    /// polled again afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O errors occur.
    fn next(&mut self) -> Result<Option<Value>>;

    /// Returns an estimate of the total number of records.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// Sink for exported entries.
///
/// 1. Create sink with output destination
/// 2. Call `write()` for each entry
/// 3. Call `finalize()` to complete the export
pub trait ExportSink {
    /// Writes a single entry to the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or I/O fails.
    fn write(&mut self, entry: &PublicationEntry) -> Result<()>;

    /// Finalizes the export, writing any footers and flushing buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if I/O fails.
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// Drains a source into a batch, logging and skipping recoverable failures.
///
/// # Errors
///
/// Returns the first unrecoverable error.
pub fn read_all(source: &mut dyn ImportSource, origin: &str) -> Result<Vec<Value>> {
    let mut batch = Vec::with_capacity(source.size_hint().unwrap_or_default());
    loop {
        match source.next() {
            Ok(Some(value)) => batch.push(value),
            Ok(None) => break,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(source = origin, error = %e, "Skipping unreadable entry");
                metrics::counter!("citemerge_records_skipped_total", "reason" => "parse")
                    .increment(1);
            },
            Err(e) => return Err(e),
        }
    }
    Ok(batch)
}

pub(crate) fn io_error(operation: &str, e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}
