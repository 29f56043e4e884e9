//! CSL-YAML adapter for import/export.
//!
//! Accepts a sequence of records, a `references:` mapping (pandoc metadata
//! style) or a document stream separated by `---`.

use serde_json::Value;
use std::io::{BufRead, Write};

use crate::io::traits::{ExportSink, ImportSource, io_error};
use crate::models::PublicationEntry;
use crate::{Error, Result};

/// YAML import source.
///
/// Parses all documents upfront since YAML requires full parsing.
pub struct YamlImportSource {
    records: std::vec::IntoIter<Value>,
    len: usize,
}

impl YamlImportSource {
    /// Creates a new YAML import source.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is not valid YAML.
    pub fn new<R: BufRead>(mut reader: R) -> Result<Self> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| io_error("read_yaml", e))?;

        let mut records = Vec::new();
        if !content.trim().is_empty() {
            for (doc_index, document) in serde_yaml_ng::Deserializer::from_str(&content).enumerate()
            {
                let value: Value = serde::Deserialize::deserialize(document).map_err(|e| {
                    Error::InvalidInput(format!(
                        "Document {}: Failed to parse YAML: {e}",
                        doc_index + 1
                    ))
                })?;
                records.extend(flatten_document(value));
            }
        }

        Ok(Self {
            len: records.len(),
            records: records.into_iter(),
        })
    }
}

fn flatten_document(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) if map.get("references").is_some_and(Value::is_array) => {
            match map.remove("references") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        },
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

impl ImportSource for YamlImportSource {
    fn next(&mut self) -> Result<Option<Value>> {
        Ok(self.records.next())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.len)
    }
}

/// YAML export sink writing a single sequence document.
pub struct YamlExportSink<W: Write> {
    writer: W,
    entries: Vec<PublicationEntry>,
}

impl<W: Write> YamlExportSink<W> {
    /// Creates a new YAML export sink.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            entries: Vec::new(),
        }
    }
}

impl<W: Write + Send> ExportSink for YamlExportSink<W> {
    fn write(&mut self, entry: &PublicationEntry) -> Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        serde_yaml_ng::to_writer(&mut self.writer, &self.entries)
            .map_err(|e| io_error("write_yaml", e))?;
        self.writer.flush().map_err(|e| io_error("flush_yaml", e))
    }
}
