//! Identifier-list sources.

use std::sync::Arc;

use super::{ExportContext, Source, SourceItem, SourceOptions};
use crate::fetch::FetchError;
use crate::models::{FieldAccess, Record, normalize_doi};
use crate::{Error, Result};

/// A bare DOI, resolved on export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoiItem {
    doi: String,
    identity: String,
}

impl DoiItem {
    /// Creates an item from a raw DOI or DOI URL.
    ///
    /// Returns `None` if nothing remains after normalization.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        normalize_doi(raw).map(|doi| Self {
            identity: format!("doi:{doi}"),
            doi,
        })
    }

    /// Returns the normalized DOI.
    #[must_use]
    pub fn doi(&self) -> &str {
        &self.doi
    }
}

impl FieldAccess for DoiItem {
    fn field(&self, name: &str) -> Option<String> {
        (name == "DOI").then(|| self.doi.clone())
    }

    fn year(&self) -> Option<i32> {
        None
    }
}

impl SourceItem for DoiItem {
    fn identity_key(&self) -> &str {
        &self.identity
    }

    fn fetch_record(&self, ctx: &ExportContext<'_>) -> Result<Option<Record>> {
        match ctx.fetcher.fetch_doi(&self.doi) {
            Ok(value) => Record::from_value(value, &self.identity).map(Some),
            Err(FetchError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builds a source from a list of DOIs.
///
/// # Errors
///
/// Returns [`Error::MissingSourceName`] for an empty name and
/// [`Error::InvalidItemType`] for blank identifiers.
pub fn load_identifiers<S: AsRef<str>>(
    name: &str,
    identifiers: &[S],
    options: SourceOptions,
) -> Result<Source> {
    let items = identifiers
        .iter()
        .map(|raw| {
            DoiItem::new(raw.as_ref())
                .map(|item| Arc::new(item) as Arc<dyn SourceItem>)
                .ok_or_else(|| Error::InvalidItemType {
                    source_name: name.to_string(),
                    detail: format!("'{}' is not a DOI", raw.as_ref()),
                })
        })
        .collect::<Result<Vec<_>>>()?;
    Source::new(name, items, options)
}
