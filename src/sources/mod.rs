//! Identity-keyed record sources.
//!
//! A [`Source`] is a named collection of [`SourceItem`]s keyed by identity.
//! Items are cheap summaries (a DOI, a parsed bibliography entry, a registry
//! work summary) that know how to materialize a full [`Record`] on demand.
//! Exporting an item renders that record, consulting a [`CacheGateway`] so
//! that unchanged items are not fetched or rendered again.
//!
//! # Variants
//!
//! | Variant | Identity | Full record |
//! |---------|----------|-------------|
//! | [`DoiItem`] | `doi:` | DOI lookup |
//! | [`BibliographyItem`] | `doi:`, `slug:`, `key:` | the parsed entry |
//! | [`RegistryItem`] | `doi:`, `slug:`, `path:`, `id:` | DOI lookup, embedded BibTeX, work fields |

mod aggregate;
mod bibliography;
mod configured;
mod doi;
mod loader;
mod registry;

pub use aggregate::AggregateSource;
pub use bibliography::{BibliographyItem, load_bibliography, load_bibliography_file};
pub use configured::{source_loader, source_loaders};
pub use doi::{DoiItem, load_identifiers};
pub use loader::{LoadOutcome, SourceLoader, load_all};
pub use registry::{RegistryItem, RegistryWork, load_registry, registry_items, work_to_record};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::instrument;

use crate::cache::{CacheEntry, CacheGateway, cache_key, render_fingerprint};
use crate::fetch::RecordFetcher;
use crate::models::{FieldAccess, PublicationEntry, Record};
use crate::rendering::{DEFAULT_LOCALE, DEFAULT_STYLE, Formatter};
use crate::services::{ExclusionRule, is_excluded};
use crate::{Error, Result};

/// One candidate record from one origin.
pub trait SourceItem: FieldAccess + Send + Sync + fmt::Debug {
    /// Returns the identity key (stable for the lifetime of the item).
    fn identity_key(&self) -> &str;

    /// Returns the upstream last-modified timestamp in epoch milliseconds.
    ///
    /// `None` means unknown: a cached entry is then always reused.
    fn last_modified(&self) -> Option<u64> {
        None
    }

    /// Materializes the full record.
    ///
    /// Returns `Ok(None)` when the item resolves to nothing.
    ///
    /// # Errors
    ///
    /// Returns recoverable errors ([`Error::NotFound`],
    /// [`Error::TransientFetchFailure`], [`Error::ParseFailure`]) for
    /// upstream problems; callers skip the item.
    fn fetch_record(&self, ctx: &ExportContext<'_>) -> Result<Option<Record>>;
}

/// Inclusion filter applied while a source is built.
pub type ItemFilter = Arc<dyn Fn(&dyn SourceItem) -> bool + Send + Sync>;

/// Options for building a [`Source`].
#[derive(Clone)]
pub struct SourceOptions {
    /// Keeps only items for which the filter returns true.
    pub filter: Option<ItemFilter>,
    /// Records the source name in each item's provenance.
    pub tag_items: bool,
    /// Conflict priority carried into the reference manager.
    pub priority: i32,
}

impl SourceOptions {
    /// Sets the inclusion filter.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&dyn SourceItem) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Keeps only items that no exclusion rule matches.
    #[must_use]
    pub fn excluding(self, rules: Vec<ExclusionRule>) -> Self {
        if rules.is_empty() {
            return self;
        }
        self.with_filter(move |item| !is_excluded(item, &rules))
    }

    /// Sets whether items are tagged with the source name.
    #[must_use]
    pub const fn with_tag_items(mut self, tag_items: bool) -> Self {
        self.tag_items = tag_items;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            filter: None,
            tag_items: true,
            priority: 0,
        }
    }
}

impl fmt::Debug for SourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceOptions")
            .field("filter", &self.filter.is_some())
            .field("tag_items", &self.tag_items)
            .field("priority", &self.priority)
            .finish()
    }
}

/// An item together with the names of the sources that contributed it.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    /// The item.
    pub item: Arc<dyn SourceItem>,
    /// Contributing source names, in first-seen order.
    pub sources: Vec<String>,
}

impl SourceEntry {
    /// Wraps an item with an empty provenance list.
    #[must_use]
    pub fn new(item: Arc<dyn SourceItem>) -> Self {
        Self {
            item,
            sources: Vec::new(),
        }
    }

    /// Returns the item's identity key.
    #[must_use]
    pub fn identity_key(&self) -> &str {
        self.item.identity_key()
    }

    /// Appends a contributing source unless it is already listed.
    pub fn add_source(&mut self, name: &str) {
        if !self.sources.iter().any(|s| s == name) {
            self.sources.push(name.to_string());
        }
    }
}

/// A named, identity-keyed collection of items.
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    priority: i32,
    entries: Vec<SourceEntry>,
    index: HashMap<String, usize>,
}

impl Source {
    /// Builds a source from items.
    ///
    /// Items sharing an identity key replace each other: the last one wins
    /// and takes the position of the first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSourceName`] if `name` is empty.
    pub fn new(
        name: impl Into<String>,
        items: Vec<Arc<dyn SourceItem>>,
        options: SourceOptions,
    ) -> Result<Self> {
        Self::from_entries(name, items.into_iter().map(SourceEntry::new).collect(), options)
    }

    /// Builds a source from entries that may already carry provenance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSourceName`] if `name` is empty.
    pub fn from_entries(
        name: impl Into<String>,
        entries: Vec<SourceEntry>,
        options: SourceOptions,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::MissingSourceName);
        }
        let mut source = Self {
            name,
            priority: options.priority,
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::with_capacity(entries.len()),
        };

        for mut entry in entries {
            if options.tag_items {
                entry.add_source(&source.name);
            }
            if options
                .filter
                .as_ref()
                .is_some_and(|keep| !keep(entry.item.as_ref()))
            {
                continue;
            }
            let identity = entry.identity_key().to_string();
            match source.index.get(&identity) {
                Some(&slot) => {
                    tracing::debug!(source = %source.name, %identity, "Replacing item with same identity");
                    source.entries[slot] = entry;
                },
                None => {
                    source.index.insert(identity, source.entries.len());
                    source.entries.push(entry);
                },
            }
        }
        Ok(source)
    }

    /// Returns the source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the conflict priority.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the number of distinct identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the source holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns identity keys in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(SourceEntry::identity_key)
    }

    /// Returns the entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    /// Returns the entry for an identity key.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&SourceEntry> {
        self.index.get(identity).map(|&slot| &self.entries[slot])
    }

    /// Returns the entry at a position.
    #[must_use]
    pub fn at(&self, position: usize) -> Option<&SourceEntry> {
        self.entries.get(position)
    }

    /// Exports one entry. See [`export_entry`].
    ///
    /// # Errors
    ///
    /// See [`export_entry`].
    pub fn export(
        &self,
        identity: &str,
        ctx: &ExportContext<'_>,
    ) -> Result<Option<PublicationEntry>> {
        match self.get(identity) {
            Some(entry) => export_entry(&self.name, entry, ctx),
            None => Ok(None),
        }
    }

    /// Exports every item, in insertion order.
    ///
    /// Items that resolve to nothing are skipped; `order` is the position in
    /// the returned list.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable error (cache or formatter failure).
    #[instrument(skip(self, ctx), fields(source = %self.name, items = self.entries.len()))]
    pub fn export_all(&self, ctx: &ExportContext<'_>) -> Result<Vec<PublicationEntry>> {
        let mut exported = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if let Some(mut data) = export_entry(&self.name, entry, ctx)? {
                data.order = exported.len();
                exported.push(data);
            }
        }
        tracing::info!(
            source = %self.name,
            exported = exported.len(),
            skipped = self.entries.len() - exported.len(),
            "Exported source"
        );
        Ok(exported)
    }

    /// Materializes the full record of every item, bypassing the cache.
    ///
    /// Each record's origins are replaced by the entry's provenance.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable fetch error.
    #[instrument(skip(self, ctx), fields(source = %self.name, items = self.entries.len()))]
    pub fn resolve_records(&self, ctx: &ExportContext<'_>) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if let Some(mut record) = resolve_item(&self.name, entry.item.as_ref(), ctx)? {
                record.sources.clone_from(&entry.sources);
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Collaborators and options used while exporting items.
#[derive(Clone, Copy)]
pub struct ExportContext<'a> {
    /// Retrieves raw records.
    pub fetcher: &'a dyn RecordFetcher,
    /// Renders records.
    pub formatter: &'a dyn Formatter,
    /// Citation style.
    pub style: &'a str,
    /// Locale.
    pub locale: &'a str,
    /// Cache consulted before fetching.
    pub cache: Option<&'a dyn CacheGateway>,
    /// Ignore cached entries (they are still rewritten).
    pub refresh: bool,
    /// Registry works without BibTeX or DOI are skipped instead of being
    /// built from their own fields.
    pub skip_without_bibtex_or_doi: bool,
}

impl<'a> ExportContext<'a> {
    /// Creates a context with the default style and locale and no cache.
    #[must_use]
    pub const fn new(fetcher: &'a dyn RecordFetcher, formatter: &'a dyn Formatter) -> Self {
        Self {
            fetcher,
            formatter,
            style: DEFAULT_STYLE,
            locale: DEFAULT_LOCALE,
            cache: None,
            refresh: false,
            skip_without_bibtex_or_doi: false,
        }
    }

    /// Sets the cache.
    #[must_use]
    pub const fn with_cache(mut self, cache: &'a dyn CacheGateway) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets style and locale.
    #[must_use]
    pub const fn with_style(mut self, style: &'a str, locale: &'a str) -> Self {
        self.style = style;
        self.locale = locale;
        self
    }

    /// Sets the refresh flag.
    #[must_use]
    pub const fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Sets the skip flag for registry works.
    #[must_use]
    pub const fn with_skip_without_bibtex_or_doi(mut self, skip: bool) -> Self {
        self.skip_without_bibtex_or_doi = skip;
        self
    }

    /// Fingerprint of the options that affect rendered output.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let skip = if self.skip_without_bibtex_or_doi {
            "skip"
        } else {
            "keep"
        };
        render_fingerprint(&[self.style, self.locale, skip])
    }
}

impl fmt::Debug for ExportContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportContext")
            .field("style", &self.style)
            .field("locale", &self.locale)
            .field("cache", &self.cache.is_some())
            .field("refresh", &self.refresh)
            .field("skip_without_bibtex_or_doi", &self.skip_without_bibtex_or_doi)
            .finish_non_exhaustive()
    }
}

/// Exports one entry of a source.
///
/// Reuses the cached entry when it is fresh for the item's current
/// last-modified timestamp and options; otherwise fetches and renders the
/// record and writes it back. The result always carries the item's current
/// identity key and provenance.
///
/// Returns `Ok(None)` if the item resolves to nothing or a recoverable
/// upstream error occurs (logged).
///
/// # Errors
///
/// Returns cache and formatter errors.
pub fn export_entry(
    source_name: &str,
    entry: &SourceEntry,
    ctx: &ExportContext<'_>,
) -> Result<Option<PublicationEntry>> {
    let item = entry.item.as_ref();
    let identity = item.identity_key();
    let key = cache_key(source_name, identity);
    let fingerprint = ctx.fingerprint();

    let cached = match ctx.cache {
        Some(cache) if !ctx.refresh => cache.get(&key)?,
        _ => None,
    };

    let mut data = match cached.filter(|c| c.is_fresh_for(item.last_modified(), &fingerprint)) {
        Some(hit) => {
            metrics::counter!("citemerge_cache_hits_total").increment(1);
            hit.data
        },
        None => {
            metrics::counter!("citemerge_cache_misses_total").increment(1);
            let Some(record) = resolve_item(source_name, item, ctx)? else {
                return Ok(None);
            };
            let data = render_record(&record, ctx)?;
            if let Some(cache) = ctx.cache {
                cache.set(
                    &key,
                    CacheEntry::new(identity, data.clone(), item.last_modified(), fingerprint),
                )?;
            }
            data
        },
    };

    data.id = identity.to_string();
    data.sources.clone_from(&entry.sources);
    Ok(Some(data))
}

/// Materializes an item's full record, logging and skipping items that
/// resolve to nothing or fail recoverably.
fn resolve_item(
    source_name: &str,
    item: &dyn SourceItem,
    ctx: &ExportContext<'_>,
) -> Result<Option<Record>> {
    let identity = item.identity_key();
    match item.fetch_record(ctx) {
        Ok(Some(record)) => Ok(Some(record)),
        Ok(None) => {
            tracing::warn!(
                source = source_name,
                identity,
                "Item resolved to no record, skipping"
            );
            Ok(None)
        },
        Err(e) if e.is_recoverable() => {
            tracing::warn!(
                source = source_name,
                identity,
                title = %item.field("title").unwrap_or_default(),
                error = %e,
                "Failed to fetch record, skipping"
            );
            metrics::counter!("citemerge_records_skipped_total", "reason" => "fetch").increment(1);
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

fn render_record(record: &Record, ctx: &ExportContext<'_>) -> Result<PublicationEntry> {
    let formatted = ctx
        .formatter
        .format(std::slice::from_ref(record), ctx.style, ctx.locale)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::OperationFailed {
            operation: "format_record".to_string(),
            cause: format!("formatter returned nothing for '{}'", record.id),
        })?;

    Ok(PublicationEntry {
        id: record.identity_key(),
        sources: Vec::new(),
        year: record.year(),
        order: 0,
        text: formatted.text,
        html: formatted.html,
        citation: formatted.citation,
        bibtex: formatted.bibtex,
        props: record.to_value(),
        custom: serde_json::Map::new(),
    })
}
