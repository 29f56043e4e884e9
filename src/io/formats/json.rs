//! CSL-JSON adapter for import/export.
//!
//! Import accepts a JSON array of records, a single record object, or
//! newline-delimited JSON. Export writes a pretty-printed JSON array.

use serde_json::Value;
use std::io::{BufRead, Write};

use crate::io::traits::{ExportSink, ImportSource, io_error};
use crate::models::PublicationEntry;
use crate::{Error, Result};

/// CSL-JSON import source.
pub struct JsonImportSource<R: BufRead> {
    reader: R,
    /// Buffered records when parsing array format.
    buffer: Vec<Value>,
    /// Current index into buffer.
    buffer_index: usize,
    /// Whether we've detected and started parsing.
    started: bool,
    /// Whether the whole document was buffered.
    buffered_mode: bool,
    /// Line number for error reporting.
    line_number: usize,
    /// Origin used in parse errors.
    origin: String,
}

impl<R: BufRead> JsonImportSource<R> {
    /// Creates a new JSON import source.
    pub fn new(reader: R, origin: impl Into<String>) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            buffer_index: 0,
            started: false,
            buffered_mode: false,
            line_number: 0,
            origin: origin.into(),
        }
    }

    fn parse_failure(&self, detail: String) -> Error {
        Error::ParseFailure {
            origin: self.origin.clone(),
            detail,
        }
    }

    /// Detects array vs. NDJSON from the first non-empty line.
    fn detect_format(&mut self) -> Result<bool> {
        let mut first_line = String::new();
        loop {
            first_line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut first_line)
                .map_err(|e| io_error("read_json", e))?;
            if bytes_read == 0 {
                return Ok(false);
            }
            self.line_number += 1;
            if !first_line.trim().is_empty() {
                break;
            }
        }
        self.started = true;

        let trimmed = first_line.trim();
        let whole_document = trimmed.starts_with('[')
            || (trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_err());
        if whole_document {
            self.buffered_mode = true;
            let mut remaining = String::new();
            self.reader
                .read_to_string(&mut remaining)
                .map_err(|e| io_error("read_json", e))?;
            let document: Value = serde_json::from_str(&format!("{first_line}{remaining}"))
                .map_err(|e| Error::InvalidInput(format!("Failed to parse JSON: {e}")))?;
            self.buffer = match document {
                Value::Array(items) => items,
                other => vec![other],
            };
        } else {
            let value = serde_json::from_str(trimmed)
                .map_err(|e| self.parse_failure(format!("line 1: {e}")))?;
            self.buffer.push(value);
        }
        Ok(true)
    }
}

impl<R: BufRead> ImportSource for JsonImportSource<R> {
    fn next(&mut self) -> Result<Option<Value>> {
        if !self.started && !self.detect_format()? {
            return Ok(None);
        }

        if self.buffer_index < self.buffer.len() {
            let value = std::mem::take(&mut self.buffer[self.buffer_index]);
            self.buffer_index += 1;
            return Ok(Some(value));
        }
        if self.buffered_mode {
            return Ok(None);
        }

        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| io_error("read_json", e))?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            if !line.trim().is_empty() {
                break;
            }
        }

        serde_json::from_str(line.trim())
            .map(Some)
            .map_err(|e| self.parse_failure(format!("line {}: {e}", self.line_number)))
    }

    fn size_hint(&self) -> Option<usize> {
        self.buffered_mode.then_some(self.buffer.len())
    }
}

/// JSON export sink writing a pretty-printed array.
pub struct JsonExportSink<W: Write> {
    writer: W,
    /// Number of records written.
    count: usize,
}

impl<W: Write> JsonExportSink<W> {
    /// Creates a new JSON export sink.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }
}

impl<W: Write + Send> ExportSink for JsonExportSink<W> {
    fn write(&mut self, entry: &PublicationEntry) -> Result<()> {
        let separator = if self.count == 0 { "[\n" } else { ",\n" };
        self.writer
            .write_all(separator.as_bytes())
            .map_err(|e| io_error("write_json", e))?;
        serde_json::to_writer_pretty(&mut self.writer, entry)
            .map_err(|e| io_error("write_json", e))?;
        self.count += 1;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        let footer = if self.count == 0 { "[]\n" } else { "\n]\n" };
        self.writer
            .write_all(footer.as_bytes())
            .map_err(|e| io_error("write_json", e))?;
        self.writer.flush().map_err(|e| io_error("flush_json", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_import_ndjson() {
        let input = r#"{"id": "a", "title": "First"}

{"id": "b", "title": ["Second"]}
"#;
        let mut source = JsonImportSource::new(Cursor::new(input), "refs.ndjson");

        assert_eq!(source.next().unwrap().unwrap()["id"], "a");
        assert_eq!(source.next().unwrap().unwrap()["id"], "b");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_import_array() {
        let input = r#"[
            {"id": "a"},
            {"id": "b"}
        ]"#;
        let mut source = JsonImportSource::new(Cursor::new(input), "refs.json");

        assert_eq!(source.next().unwrap().unwrap()["id"], "a");
        assert_eq!(source.size_hint(), Some(2));
        assert_eq!(source.next().unwrap().unwrap()["id"], "b");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_import_pretty_single_object() {
        let input = "{\n  \"id\": \"only\"\n}\n";
        let mut source = JsonImportSource::new(Cursor::new(input), "one.json");
        assert_eq!(source.next().unwrap().unwrap()["id"], "only");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_bad_ndjson_line_is_recoverable() {
        let input = "{\"id\": \"a\"}\n{broken\n{\"id\": \"c\"}\n";
        let mut source = JsonImportSource::new(Cursor::new(input), "refs.ndjson");

        assert!(source.next().unwrap().is_some());
        let err = source.next().unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(source.next().unwrap().unwrap()["id"], "c");
    }

    #[test]
    fn test_export_array() {
        let mut output = Vec::new();
        {
            let mut sink = JsonExportSink::new(&mut output);
            for id in ["doi:10.1/a", "doi:10.1/b"] {
                sink.write(&PublicationEntry {
                    id: id.to_string(),
                    ..PublicationEntry::default()
                })
                .unwrap();
            }
            Box::new(sink).finalize().unwrap();
        }

        let parsed: Vec<PublicationEntry> = serde_json::from_slice(&output).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].id, "doi:10.1/b");
    }

    #[test]
    fn test_export_empty_is_valid_json() {
        let mut output = Vec::new();
        Box::new(JsonExportSink::new(&mut output)).finalize().unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&output).unwrap();
        assert!(parsed.is_empty());
    }
}
