//! Format adapters for reading record batches and writing entries.
//!
//! Record formats implement [`ImportSource`]; identifier lists are read
//! eagerly into `Vec<String>`; export formats implement [`ExportSink`].

pub mod bibtex;
pub mod csv;
pub mod identifiers;
pub mod json;
pub mod yaml;

use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use super::traits::{ExportSink, ImportSource};
use crate::{Error, Result};

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// CSL-JSON array or newline-delimited CSL-JSON.
    CslJson,
    /// CSL-YAML.
    Yaml,
    /// BibTeX.
    Bibtex,
    /// Plain-text identifier list.
    Text,
    /// CSV identifier list.
    Csv,
}

impl Format {
    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::CslJson => "json",
            Self::Yaml => "yaml",
            Self::Bibtex => "bib",
            Self::Text => "txt",
            Self::Csv => "csv",
        }
    }

    /// Detects format from file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not recognized.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match ext.as_deref() {
            Some(ext) => Self::from_str(ext).map_err(|_| {
                Error::InvalidInput(format!("Unsupported file extension: .{ext}"))
            }),
            None => Err(Error::InvalidInput(
                "Cannot determine format: file has no extension".to_string(),
            )),
        }
    }

    /// Returns whether the format carries full records.
    #[must_use]
    pub const fn holds_records(&self) -> bool {
        matches!(self, Self::CslJson | Self::Yaml | Self::Bibtex)
    }

    /// Returns whether entries can be exported in this format.
    #[must_use]
    pub const fn supports_export(&self) -> bool {
        matches!(self, Self::CslJson | Self::Yaml)
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" | "csl" | "csl-json" | "ndjson" | "jsonl" => Ok(Self::CslJson),
            "yaml" | "yml" => Ok(Self::Yaml),
            "bib" | "bibtex" => Ok(Self::Bibtex),
            "txt" | "text" | "list" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            _ => Err(Error::InvalidInput(format!("Unknown format: {s}"))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CslJson => write!(f, "csl-json"),
            Self::Yaml => write!(f, "yaml"),
            Self::Bibtex => write!(f, "bibtex"),
            Self::Text => write!(f, "text"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Creates an import source for a record format.
///
/// # Errors
///
/// Returns an error if the format holds identifiers rather than records or
/// the input cannot be read.
pub fn create_import_source<R: BufRead + 'static>(
    reader: R,
    format: Format,
    origin: &str,
) -> Result<Box<dyn ImportSource>> {
    match format {
        Format::CslJson => Ok(Box::new(json::JsonImportSource::new(reader, origin))),
        Format::Yaml => Ok(Box::new(yaml::YamlImportSource::new(reader)?)),
        Format::Bibtex => Ok(Box::new(bibtex::BibtexImportSource::new(reader, origin)?)),
        Format::Text | Format::Csv => Err(Error::InvalidInput(format!(
            "{format} files hold identifiers, not records"
        ))),
    }
}

/// Reads an identifier list.
///
/// JSON input must be an array of strings.
///
/// # Errors
///
/// Returns [`Error::InvalidItemType`] for malformed lists.
pub fn read_identifiers<R: BufRead>(
    reader: R,
    format: Format,
    source_name: &str,
) -> Result<Vec<String>> {
    match format {
        Format::Text => identifiers::read_text_identifiers(reader),
        Format::Csv => csv::read_csv_identifiers(reader, source_name),
        Format::CslJson => identifiers::read_json_identifiers(reader, source_name),
        Format::Yaml | Format::Bibtex => Err(Error::InvalidItemType {
            source_name: source_name.to_string(),
            detail: format!("{format} files cannot hold identifier lists"),
        }),
    }
}

/// Creates an export sink for the given format and writer.
///
/// # Errors
///
/// Returns an error if the format cannot be exported.
pub fn create_export_sink<W: Write + Send + 'static>(
    writer: W,
    format: Format,
) -> Result<Box<dyn ExportSink>> {
    match format {
        Format::CslJson => Ok(Box::new(json::JsonExportSink::new(writer))),
        Format::Yaml => Ok(Box::new(yaml::YamlExportSink::new(writer))),
        other => Err(Error::InvalidInput(format!(
            "Export to {other} is not supported"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_str() {
        assert_eq!(Format::from_str("json").unwrap(), Format::CslJson);
        assert_eq!(Format::from_str("YAML").unwrap(), Format::Yaml);
        assert_eq!(Format::from_str("bib").unwrap(), Format::Bibtex);
        assert!(Format::from_str("unknown").is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            Format::from_path(Path::new("refs.bib")).unwrap(),
            Format::Bibtex
        );
        assert_eq!(
            Format::from_path(Path::new("dois.txt")).unwrap(),
            Format::Text
        );
        assert_eq!(
            Format::from_path(Path::new("refs.ndjson")).unwrap(),
            Format::CslJson
        );
        assert!(Format::from_path(Path::new("refs.docx")).is_err());
        assert!(Format::from_path(Path::new("refs")).is_err());
    }

    #[test]
    fn test_format_capabilities() {
        assert!(Format::Bibtex.holds_records());
        assert!(!Format::Text.holds_records());
        assert!(Format::Yaml.supports_export());
        assert!(!Format::Bibtex.supports_export());
    }

    #[test]
    fn test_identifier_format_is_not_a_record_source() {
        assert!(create_import_source(std::io::Cursor::new(""), Format::Text, "x").is_err());
    }
}
