//! Registry-lookup sources (ORCID-style researcher profiles).
//!
//! A profile lists work summaries grouped by the registry; each group's
//! first summary becomes one [`RegistryItem`]. Full records are resolved
//! lazily on export:
//!
//! 1. a DOI is looked up directly
//! 2. otherwise the full work is fetched by put-code and turned into a
//!    record from its embedded BibTeX, its DOI, or (unless skipped) its own
//!    fields

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{ExportContext, Source, SourceItem, SourceOptions};
use crate::fetch::{FetchError, RecordFetcher};
use crate::io::formats::bibtex::parse_bibtex_to_csl;
use crate::models::{FieldAccess, Name, Record, derive_identity, generated_key, normalize_doi};
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct Wrapped<T> {
    #[serde(default)]
    value: Option<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct WorkTitle {
    #[serde(default)]
    title: Option<Wrapped<String>>,
    #[serde(default)]
    subtitle: Option<Wrapped<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ExternalId {
    #[serde(default)]
    external_id_type: Option<String>,
    #[serde(default)]
    external_id_value: Option<String>,
    #[serde(default)]
    external_id_normalized: Option<Wrapped<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct ExternalIds {
    #[serde(rename = "external-id", default)]
    external_id: Vec<ExternalId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct PublicationDate {
    #[serde(default)]
    year: Option<Wrapped<String>>,
    #[serde(default)]
    month: Option<Wrapped<String>>,
    #[serde(default)]
    day: Option<Wrapped<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Citation {
    #[serde(default)]
    citation_type: Option<String>,
    #[serde(default)]
    citation_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ContributorAttributes {
    #[serde(default)]
    contributor_role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Contributor {
    #[serde(default)]
    credit_name: Option<Wrapped<String>>,
    #[serde(default)]
    contributor_attributes: Option<ContributorAttributes>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct Contributors {
    #[serde(default)]
    contributor: Vec<Contributor>,
}

/// A registry work, either a summary or the full record.
///
/// Only the fields used for identity and record construction are read;
/// `null` anywhere is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryWork {
    #[serde(default)]
    put_code: Option<u64>,
    #[serde(default)]
    path: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    title: Option<WorkTitle>,
    #[serde(default)]
    external_ids: Option<ExternalIds>,
    #[serde(default)]
    last_modified_date: Option<Wrapped<u64>>,
    #[serde(default)]
    created_date: Option<Wrapped<u64>>,
    #[serde(default)]
    publication_date: Option<PublicationDate>,
    #[serde(default)]
    journal_title: Option<Wrapped<String>>,
    #[serde(default)]
    url: Option<Wrapped<String>>,
    #[serde(default)]
    citation: Option<Citation>,
    #[serde(default)]
    contributors: Option<Contributors>,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    language_code: Option<String>,
}

impl RegistryWork {
    /// Parses a work from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseFailure`] if a field has the wrong shape.
    pub fn from_value(value: Value, origin: &str) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::ParseFailure {
            origin: origin.to_string(),
            detail: e.to_string(),
        })
    }

    /// Registry put-code.
    #[must_use]
    pub const fn put_code(&self) -> Option<u64> {
        self.put_code
    }

    /// Registry path (`/<profile>/work/<put-code>`).
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Profile id taken from the path.
    #[must_use]
    pub fn profile_id(&self) -> Option<&str> {
        self.path()?.split('/').find(|part| !part.is_empty())
    }

    /// Normalized DOI from the external identifiers.
    #[must_use]
    pub fn doi(&self) -> Option<String> {
        let id = self
            .external_ids
            .as_ref()?
            .external_id
            .iter()
            .find(|id| id.external_id_type.as_deref() == Some("doi"))?;
        id.external_id_normalized
            .as_ref()
            .and_then(|n| n.value.as_deref())
            .or(id.external_id_value.as_deref())
            .and_then(normalize_doi)
    }

    /// Work title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title
            .as_ref()?
            .title
            .as_ref()?
            .value
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    /// Work subtitle.
    #[must_use]
    pub fn subtitle(&self) -> Option<&str> {
        self.title.as_ref()?.subtitle.as_ref()?.value.as_deref()
    }

    /// Publication year.
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.date_part(|d| d.year.as_ref())
    }

    fn date_part<F>(&self, part: F) -> Option<i32>
    where
        F: Fn(&PublicationDate) -> Option<&Wrapped<String>>,
    {
        part(self.publication_date.as_ref()?)?
            .value
            .as_deref()?
            .trim()
            .parse()
            .ok()
    }

    /// Last modification, epoch milliseconds.
    #[must_use]
    pub fn last_modified(&self) -> Option<u64> {
        self.last_modified_date.as_ref()?.value
    }

    /// Creation, epoch milliseconds.
    #[must_use]
    pub fn created(&self) -> Option<u64> {
        self.created_date.as_ref()?.value
    }

    /// Journal title.
    #[must_use]
    pub fn journal(&self) -> Option<&str> {
        self.journal_title.as_ref()?.value.as_deref()
    }

    /// Registry work type (`journal-article`, ...).
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Landing page URL.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_ref()?.value.as_deref()
    }

    /// Embedded BibTeX citation.
    #[must_use]
    pub fn bibtex(&self) -> Option<&str> {
        let citation = self.citation.as_ref()?;
        if citation.citation_type.as_deref() == Some("bibtex") {
            citation.citation_value.as_deref().filter(|v| !v.trim().is_empty())
        } else {
            None
        }
    }

    /// Credit names of contributors with the author role.
    #[must_use]
    pub fn authors(&self) -> Vec<&str> {
        self.contributors
            .iter()
            .flat_map(|c| &c.contributor)
            .filter(|c| {
                c.contributor_attributes
                    .as_ref()
                    .and_then(|a| a.contributor_role.as_deref())
                    == Some("author")
            })
            .filter_map(|c| c.credit_name.as_ref()?.value.as_deref())
            .collect()
    }

    /// Short description (abstract).
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.short_description.as_deref()
    }

    fn identity(&self) -> String {
        derive_identity(self.doi().as_deref(), self.title(), self.year(), || {
            self.path()
                .map_or_else(generated_key, |path| format!("path:{path}"))
        })
    }
}

/// Builds a record from a work's own fields.
#[must_use]
pub fn work_to_record(work: &RegistryWork, id: &str) -> Record {
    let mut record = Record::new(id);
    record.kind = Some(csl_type(work.kind().unwrap_or_default()).to_string());
    record.title = match (work.title(), work.subtitle()) {
        (Some(title), Some(subtitle)) if !subtitle.trim().is_empty() => {
            Some(format!("{title}: {subtitle}"))
        },
        (title, _) => title.map(str::to_string),
    };
    if let Some(year) = work.year() {
        let parts: Vec<Value> = [
            Some(year),
            work.date_part(|d| d.month.as_ref()),
            work.date_part(|d| d.day.as_ref()),
        ]
        .into_iter()
        .map_while(|part| part.map(Value::from))
        .collect();
        record.issued = Some(crate::models::Issued {
            date_parts: vec![parts],
            ..crate::models::Issued::default()
        });
    }
    record.container_title = work.journal().map(str::to_string);
    record.url = work.url().map(str::to_string);
    record.doi = work.doi();
    record.refresh_normalized_doi();
    record.author = work.authors().into_iter().map(Name::parse).collect();
    if let Some(description) = work.description() {
        record
            .extra
            .insert("abstract".to_string(), Value::from(description));
    }
    if let Some(language) = &work.language_code {
        record
            .extra
            .insert("language".to_string(), Value::from(language.as_str()));
    }
    record
}

fn csl_type(kind: &str) -> &'static str {
    match kind {
        "journal-article" => "article-journal",
        "conference-paper" | "conference-abstract" | "conference-poster" => "paper-conference",
        "book" | "edited-book" => "book",
        "book-chapter" => "chapter",
        "dissertation" | "dissertation-thesis" => "thesis",
        "report" | "working-paper" => "report",
        "preprint" => "article",
        "data-set" => "dataset",
        "software" => "software",
        "magazine-article" => "article-magazine",
        "newspaper-article" => "article-newspaper",
        "website" | "online-resource" => "webpage",
        _ => "document",
    }
}

/// A work summary from a registry profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryItem {
    registry_id: String,
    summary: RegistryWork,
    identity: String,
}

impl RegistryItem {
    /// Creates an item from a work summary.
    #[must_use]
    pub fn new(registry_id: impl Into<String>, summary: RegistryWork) -> Self {
        let identity = summary.identity();
        Self {
            registry_id: registry_id.into(),
            summary,
            identity,
        }
    }

    /// Returns the summary.
    #[must_use]
    pub const fn summary(&self) -> &RegistryWork {
        &self.summary
    }

    fn lookup_doi(&self, fetcher: &dyn RecordFetcher, doi: &str) -> Result<Option<Record>> {
        match fetcher.fetch_doi(doi) {
            Ok(value) => Record::from_value(value, &self.identity).map(Some),
            Err(FetchError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn record_from_work(&self, work: &RegistryWork, ctx: &ExportContext<'_>) -> Option<Record> {
        if let Some(bibtex) = work.bibtex() {
            let parsed = parse_bibtex_to_csl(bibtex, &self.identity)
                .into_iter()
                .find_map(std::result::Result::ok)
                .and_then(|value| Record::from_value(value, &self.identity).ok());
            if parsed.is_some() {
                return parsed;
            }
            tracing::debug!(identity = %self.identity, "Embedded BibTeX unusable");
        }
        if let Some(doi) = work.doi() {
            match self.lookup_doi(ctx.fetcher, &doi) {
                Ok(Some(record)) => return Some(record),
                Ok(None) => {},
                Err(e) => tracing::debug!(identity = %self.identity, error = %e, "DOI lookup failed"),
            }
        }
        if ctx.skip_without_bibtex_or_doi {
            return None;
        }
        Some(work_to_record(work, &self.identity))
    }
}

impl FieldAccess for RegistryItem {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "DOI" => self.summary.doi(),
            "title" => self.summary.title().map(str::to_string),
            "type" => self.summary.kind().map(str::to_string),
            "container-title" => self.summary.journal().map(str::to_string),
            "URL" => self.summary.url().map(str::to_string),
            "path" => self.summary.path().map(str::to_string),
            "put-code" => self.summary.put_code().map(|c| c.to_string()),
            _ => None,
        }
    }

    fn year(&self) -> Option<i32> {
        self.summary.year()
    }
}

impl SourceItem for RegistryItem {
    fn identity_key(&self) -> &str {
        &self.identity
    }

    fn last_modified(&self) -> Option<u64> {
        self.summary.last_modified()
    }

    fn fetch_record(&self, ctx: &ExportContext<'_>) -> Result<Option<Record>> {
        if let Some(doi) = self.summary.doi() {
            return self.lookup_doi(ctx.fetcher, &doi);
        }
        let Some(put_code) = self.summary.put_code() else {
            tracing::warn!(
                identity = %self.identity,
                "Cannot retrieve a work without DOI or put-code"
            );
            return Ok(None);
        };
        let work = match ctx.fetcher.fetch_work(&self.registry_id, put_code) {
            Ok(value) => RegistryWork::from_value(value, &self.identity)?,
            Err(FetchError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(self.record_from_work(&work, ctx))
    }
}

/// Turns a works response (`{"group": [{"work-summary": [..]}]}`) into
/// items.
///
/// Groups whose summary cannot be parsed are logged and skipped.
///
/// # Errors
///
/// Returns [`Error::InvalidItemType`] if the response has no `group` array.
pub fn registry_items(
    source_name: &str,
    registry_id: &str,
    works: &Value,
) -> Result<Vec<Arc<dyn SourceItem>>> {
    let groups = works
        .get("group")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidItemType {
            source_name: source_name.to_string(),
            detail: "works response has no `group` array".to_string(),
        })?;

    let mut items: Vec<Arc<dyn SourceItem>> = Vec::with_capacity(groups.len());
    for group in groups {
        let summary = group
            .get("work-summary")
            .and_then(Value::as_array)
            .and_then(|s| s.first())
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        match RegistryWork::from_value(summary, source_name) {
            Ok(work) => items.push(Arc::new(RegistryItem::new(registry_id, work))),
            Err(e) => tracing::warn!(source = source_name, error = %e, "Skipping work summary"),
        }
    }
    Ok(items)
}

/// Builds a source from a registry profile.
///
/// # Errors
///
/// Returns [`Error::NotFound`] or [`Error::TransientFetchFailure`] if the
/// profile cannot be listed and [`Error::InvalidItemType`] for malformed
/// responses.
pub fn load_registry(
    name: &str,
    registry_id: &str,
    fetcher: &dyn RecordFetcher,
    options: SourceOptions,
) -> Result<Source> {
    let works = fetcher.fetch_works(registry_id)?;
    let items = registry_items(name, registry_id, &works)?;
    tracing::info!(source = name, registry_id, works = items.len(), "Listed registry works");
    Source::new(name, items, options)
}
