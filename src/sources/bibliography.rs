//! Bibliography-file sources (CSL-JSON, CSL-YAML, BibTeX).

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use super::{ExportContext, Source, SourceItem, SourceOptions};
use crate::io::read_record_file;
use crate::models::{FieldAccess, Record, derive_identity, generated_key};
use crate::{Error, Result};

/// A record read from a bibliography file.
#[derive(Debug, Clone, PartialEq)]
pub struct BibliographyItem {
    record: Record,
    identity: String,
}

impl BibliographyItem {
    /// Wraps a parsed record.
    #[must_use]
    pub fn new(record: Record) -> Self {
        let identity = derive_identity(
            record.comparable_doi().as_deref(),
            record.title.as_deref(),
            record.year(),
            || {
                record
                    .citation_key
                    .as_ref()
                    .map_or_else(generated_key, |key| format!("key:{key}"))
            },
        );
        Self { record, identity }
    }

    /// Returns the wrapped record.
    #[must_use]
    pub const fn record(&self) -> &Record {
        &self.record
    }
}

impl FieldAccess for BibliographyItem {
    fn field(&self, name: &str) -> Option<String> {
        self.record.field(name)
    }

    fn year(&self) -> Option<i32> {
        self.record.year()
    }
}

impl SourceItem for BibliographyItem {
    fn identity_key(&self) -> &str {
        &self.identity
    }

    fn fetch_record(&self, _ctx: &ExportContext<'_>) -> Result<Option<Record>> {
        Ok(Some(self.record.clone()))
    }
}

/// Builds a source from raw CSL-JSON values.
///
/// Objects that fail to parse are logged and skipped.
///
/// # Errors
///
/// Returns [`Error::InvalidItemType`] if an entry is not an object and
/// [`Error::MissingSourceName`] for an empty name.
pub fn load_bibliography(name: &str, batch: Vec<Value>, options: SourceOptions) -> Result<Source> {
    let mut items: Vec<Arc<dyn SourceItem>> = Vec::with_capacity(batch.len());
    for (position, value) in batch.into_iter().enumerate() {
        if !value.is_object() {
            return Err(Error::InvalidItemType {
                source_name: name.to_string(),
                detail: format!("entry {position} is not a CSL-JSON object"),
            });
        }
        match Record::from_value(value, name) {
            Ok(record) => items.push(Arc::new(BibliographyItem::new(record))),
            Err(e) => {
                tracing::warn!(source = name, position, error = %e, "Skipping unparseable entry");
                metrics::counter!("citemerge_records_skipped_total", "reason" => "parse")
                    .increment(1);
            },
        }
    }
    Source::new(name, items, options)
}

/// Builds a source from a bibliography file, detecting its format.
///
/// # Errors
///
/// Returns an error if the file cannot be read or holds no records.
pub fn load_bibliography_file(name: &str, path: &Path, options: SourceOptions) -> Result<Source> {
    load_bibliography(name, read_record_file(path)?, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_precedence() {
        let item = BibliographyItem::new(Record::new("a").with_doi("10.1/X").with_title("T"));
        assert_eq!(item.identity_key(), "doi:10.1/x");

        let item = BibliographyItem::new(Record::new("a").with_title("Some Title").with_year(2019));
        assert_eq!(item.identity_key(), "slug:2019_some-title");

        let mut record = Record::new("a").with_title("Undated");
        record.citation_key = Some("undated".to_string());
        assert_eq!(BibliographyItem::new(record).identity_key(), "key:undated");

        let item = BibliographyItem::new(Record::new("a"));
        assert!(item.identity_key().starts_with("id:"));
    }

    #[test]
    fn test_load_skips_bad_objects() {
        let source = load_bibliography(
            "bib",
            vec![json!({"title": "ok", "DOI": "10.1/a"}), json!({"author": "bad"})],
            SourceOptions::default(),
        )
        .unwrap();
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_non_object_is_invalid_item() {
        let err = load_bibliography("bib", vec![json!(42)], SourceOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidItemType { .. }));
    }
}
