//! Reference manager.
//!
//! Collects record batches from named, prioritized origins into one working
//! list, removes duplicates and exports ordered entries.
//!
//! # Lifecycle
//!
//! ```text
//! add(batch, options)  ─┐   parse → tag origin → exclude → append
//! add(batch, options)  ─┤
//!                       ▼
//!              deduplicate()      group → resolve by priority → merge origins
//!                       ▼
//!              output(formatter)  render → order → custom fields → transform
//! ```

mod exclusion;

pub use exclusion::{
    ExclusionConfig, ExclusionRule, FieldPredicate, compile_rules, is_excluded,
};

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::instrument;

use super::deduplication::{GroupingOptions, group_duplicates};
use crate::models::{PublicationEntry, Record};
use crate::rendering::{DEFAULT_LOCALE, DEFAULT_STYLE, FormattedEntry, Formatter};
use crate::{Error, Result};

/// Options for [`ReferenceManager::add`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Origin name; generated as `source_<n>` when absent.
    pub name: Option<String>,
    /// Exclusion rules; a record is dropped if any rule matches.
    pub exclude: Vec<ExclusionRule>,
    /// Conflict priority; higher wins.
    pub priority: i32,
    /// Free-form metadata stored with the origin.
    pub metadata: Map<String, Value>,
}

impl AddOptions {
    /// Creates options for a named origin.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds an exclusion rule.
    #[must_use]
    pub fn with_exclusion(mut self, rule: ExclusionRule) -> Self {
        self.exclude.push(rule);
        self
    }

    /// Adds a metadata value.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A registered origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    /// Origin name.
    pub name: String,
    /// Conflict priority.
    pub priority: i32,
    /// Ids of every record parsed from this origin, excluded ones included.
    pub record_ids: Vec<String>,
    /// Whether the name was generated.
    pub auto_named: bool,
    /// Metadata passed with [`AddOptions`].
    pub metadata: Map<String, Value>,
}

/// Outcome of one [`ReferenceManager::add`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    /// Name the batch was registered under.
    pub source: String,
    /// Entries parsed into records.
    pub parsed: usize,
    /// Entries that failed to parse.
    pub skipped: usize,
    /// Records dropped by exclusion rules.
    pub excluded: usize,
    /// Records appended to the working list.
    pub added: usize,
}

/// Outcome of [`ReferenceManager::deduplicate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    /// Records before deduplication.
    pub before: usize,
    /// Records after deduplication.
    pub after: usize,
    /// Pairwise comparisons performed.
    pub comparisons: usize,
}

impl DedupReport {
    /// Number of records removed.
    #[must_use]
    pub const fn removed(&self) -> usize {
        self.before - self.after
    }
}

/// Adds custom fields to an exported entry.
pub type CustomFields = Arc<dyn Fn(&Record) -> Map<String, Value> + Send + Sync>;

/// Rewrites an exported entry.
pub type Transform = Arc<dyn Fn(PublicationEntry) -> PublicationEntry + Send + Sync>;

/// Options for [`ReferenceManager::output`].
#[derive(Clone)]
pub struct OutputOptions {
    /// Citation style.
    pub style: String,
    /// Locale.
    pub locale: String,
    /// Applied to every record; the returned fields are merged into the entry.
    pub custom_fields: Option<CustomFields>,
    /// Applied to every entry after custom fields.
    pub transform: Option<Transform>,
}

impl OutputOptions {
    /// Sets the style.
    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    /// Sets the locale.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Sets the custom-fields hook.
    #[must_use]
    pub fn with_custom_fields<F>(mut self, func: F) -> Self
    where
        F: Fn(&Record) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.custom_fields = Some(Arc::new(func));
        self
    }

    /// Sets the transform hook.
    #[must_use]
    pub fn with_transform<F>(mut self, func: F) -> Self
    where
        F: Fn(PublicationEntry) -> PublicationEntry + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(func));
        self
    }
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            style: DEFAULT_STYLE.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            custom_fields: None,
            transform: None,
        }
    }
}

impl fmt::Debug for OutputOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputOptions")
            .field("style", &self.style)
            .field("locale", &self.locale)
            .field("custom_fields", &self.custom_fields.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Returns the priority of a record: the highest priority among its origins.
///
/// Unknown origins count as priority 0.
#[must_use]
pub fn record_priority(record: &Record, sources: &[SourceInfo]) -> i32 {
    record
        .sources
        .iter()
        .map(|name| {
            sources
                .iter()
                .find(|s| s.name == *name)
                .map_or(0, |s| s.priority)
        })
        .max()
        .unwrap_or(0)
}

/// Default resolver: the member with the highest priority, first one on ties.
#[must_use]
pub fn priority_resolver(group: &[&Record], sources: &[SourceInfo]) -> usize {
    let mut best = 0;
    let mut best_priority = i32::MIN;
    for (i, record) in group.iter().enumerate() {
        let priority = record_priority(record, sources);
        if priority > best_priority {
            best = i;
            best_priority = priority;
        }
    }
    best
}

/// Manages references from multiple origins.
#[derive(Debug, Clone, Default)]
pub struct ReferenceManager {
    records: Vec<Record>,
    sources: Vec<SourceInfo>,
}

impl ReferenceManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the working list.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the registered origins in registration order.
    #[must_use]
    pub fn sources(&self) -> &[SourceInfo] {
        &self.sources
    }

    /// Returns a registered origin by name.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&SourceInfo> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Returns the number of records in the working list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the working list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds a batch of raw CSL-JSON records.
    ///
    /// Entries that cannot be parsed are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSourceName`] if the name is already taken.
    #[instrument(skip(self, batch, options), fields(source = options.name.as_deref(), batch = batch.len()))]
    pub fn add(&mut self, batch: Vec<Value>, options: AddOptions) -> Result<AddReport> {
        let (name, auto_named) = self.register_name(options.name.as_deref())?;
        let mut records = Vec::with_capacity(batch.len());
        let mut skipped = 0;

        for value in batch {
            match Record::from_value(value, &name) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(source = %name, error = %e, "Skipping unparseable record");
                    metrics::counter!("citemerge_records_skipped_total", "reason" => "parse")
                        .increment(1);
                },
            }
        }

        let mut report = self.append(records, name, auto_named, options);
        report.skipped = skipped;
        Ok(report)
    }

    /// Adds already parsed records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSourceName`] if the name is already taken.
    pub fn add_records(&mut self, records: Vec<Record>, options: AddOptions) -> Result<AddReport> {
        let (name, auto_named) = self.register_name(options.name.as_deref())?;
        Ok(self.append(records, name, auto_named, options))
    }

    fn register_name(&self, requested: Option<&str>) -> Result<(String, bool)> {
        let (name, auto_named) = match requested.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => (name.to_string(), false),
            None => (format!("source_{}", self.sources.len()), true),
        };
        if self.source(&name).is_some() {
            return Err(Error::DuplicateSourceName(name));
        }
        Ok((name, auto_named))
    }

    fn append(
        &mut self,
        records: Vec<Record>,
        name: String,
        auto_named: bool,
        options: AddOptions,
    ) -> AddReport {
        let mut report = AddReport {
            source: name.clone(),
            parsed: records.len(),
            ..AddReport::default()
        };
        let record_ids = records.iter().map(|r| r.id.clone()).collect();

        for mut record in records {
            record.sources = vec![name.clone()];
            record.refresh_normalized_doi();
            if is_excluded(&record, &options.exclude) {
                report.excluded += 1;
                tracing::debug!(
                    source = %name,
                    id = %record.id,
                    title = record.title.as_deref().unwrap_or_default(),
                    "Excluded record"
                );
                continue;
            }
            self.records.push(record);
            report.added += 1;
        }

        self.sources.push(SourceInfo {
            name,
            priority: options.priority,
            record_ids,
            auto_named,
            metadata: options.metadata,
        });
        metrics::counter!("citemerge_records_added_total").increment(report.added as u64);
        tracing::info!(
            source = %report.source,
            added = report.added,
            excluded = report.excluded,
            "Added records"
        );
        report
    }

    /// Removes duplicates, keeping the highest-priority member of each group.
    ///
    /// # Errors
    ///
    /// Propagates comparator errors; the working list is unchanged on error.
    pub fn deduplicate(&mut self, options: &GroupingOptions) -> Result<DedupReport> {
        self.deduplicate_with(options, priority_resolver)
    }

    /// Removes duplicates using a custom resolver.
    ///
    /// `resolve` receives the members of one group (in input order) and
    /// returns the position of the survivor within the group. The survivor's
    /// origin list becomes the union of every member's origins, in order.
    ///
    /// # Errors
    ///
    /// Propagates comparator errors and returns [`Error::OperationFailed`]
    /// if the resolver picks a position outside the group. The working list
    /// is unchanged on error.
    #[instrument(skip(self, options, resolve), fields(records = self.records.len()))]
    pub fn deduplicate_with<F>(&mut self, options: &GroupingOptions, mut resolve: F) -> Result<DedupReport>
    where
        F: FnMut(&[&Record], &[SourceInfo]) -> usize,
    {
        let grouping = group_duplicates(&self.records, options)?;

        let mut plan: Vec<(usize, Vec<String>)> = Vec::with_capacity(grouping.groups.len());
        for group in &grouping.groups {
            let members: Vec<&Record> = group.iter().map(|&i| &self.records[i]).collect();
            let pick = resolve(&members, &self.sources);
            let Some(&survivor) = group.get(pick) else {
                return Err(Error::OperationFailed {
                    operation: "resolve_duplicates".to_string(),
                    cause: format!("resolver picked {pick} in a group of {}", group.len()),
                });
            };
            let mut origins: Vec<String> = Vec::new();
            for member in &members {
                for name in &member.sources {
                    if !origins.contains(name) {
                        origins.push(name.clone());
                    }
                }
            }
            plan.push((survivor, origins));
        }

        let before = self.records.len();
        let mut slots: Vec<Option<Record>> =
            std::mem::take(&mut self.records).into_iter().map(Some).collect();
        self.records = plan
            .into_iter()
            .filter_map(|(index, origins)| {
                slots[index].take().map(|mut record| {
                    record.sources = origins;
                    record
                })
            })
            .collect();

        let report = DedupReport {
            before,
            after: self.records.len(),
            comparisons: grouping.comparisons,
        };
        metrics::counter!("citemerge_duplicates_merged_total").increment(report.removed() as u64);
        tracing::info!(
            before = report.before,
            after = report.after,
            comparisons = report.comparisons,
            "Deduplicated records"
        );
        Ok(report)
    }

    /// Renders every record into an exported entry.
    ///
    /// Entries are returned in bibliography order; `order` is the zero-based
    /// position in that order. Custom fields named like an entry field
    /// (see [`PublicationEntry::RESERVED_FIELDS`]) are dropped.
    ///
    /// `id` is the record's identity key. Records left apart by deduplication
    /// (or when it never ran) can share an identity key, so entry ids are only
    /// unique after [`Self::deduplicate`] with a pipeline that compares DOIs.
    ///
    /// # Errors
    ///
    /// Propagates formatter errors and returns [`Error::OperationFailed`] if
    /// the formatter does not return every record exactly once.
    #[instrument(skip(self, formatter, options), fields(records = self.records.len(), style = %options.style))]
    pub fn output(
        &self,
        formatter: &dyn Formatter,
        options: &OutputOptions,
    ) -> Result<Vec<PublicationEntry>> {
        let rendered = formatter.format(&self.records, &options.style, &options.locale)?;
        check_coverage(&rendered, self.records.len())?;

        Ok(rendered
            .into_iter()
            .enumerate()
            .map(|(order, formatted)| {
                let record = &self.records[formatted.index];
                let mut entry = PublicationEntry {
                    id: record.identity_key(),
                    sources: record.sources.clone(),
                    year: record.year(),
                    order,
                    text: formatted.text,
                    html: formatted.html,
                    citation: formatted.citation,
                    bibtex: formatted.bibtex,
                    props: record.to_value(),
                    custom: Map::new(),
                };
                if let Some(custom_fields) = &options.custom_fields {
                    for (key, value) in custom_fields(record) {
                        if PublicationEntry::is_reserved_field(&key) {
                            tracing::warn!(field = %key, id = %entry.id, "Ignoring reserved custom field");
                            continue;
                        }
                        entry.custom.insert(key, value);
                    }
                }
                match &options.transform {
                    Some(transform) => transform(entry),
                    None => entry,
                }
            })
            .collect())
    }
}

fn check_coverage(rendered: &[FormattedEntry], expected: usize) -> Result<()> {
    let mut seen = vec![false; expected];
    for entry in rendered {
        match seen.get_mut(entry.index) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(Error::OperationFailed {
                    operation: "format_bibliography".to_string(),
                    cause: format!("formatter returned index {} out of place", entry.index),
                });
            },
        }
    }
    if rendered.len() == expected {
        Ok(())
    } else {
        Err(Error::OperationFailed {
            operation: "format_bibliography".to_string(),
            cause: format!("formatter returned {} of {expected} records", rendered.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::BasicFormatter;
    use serde_json::json;

    #[test]
    fn test_add_tags_origin_and_skips_bad_entries() {
        let mut manager = ReferenceManager::new();
        let report = manager
            .add(
                vec![json!({"DOI": "10.1/A", "title": "x"}), json!("not a record")],
                AddOptions::named("lab"),
            )
            .unwrap();
        assert_eq!(report.parsed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(manager.records()[0].sources, vec!["lab"]);
        assert_eq!(manager.records()[0].normalized_doi.as_deref(), Some("10.1/a"));
    }

    #[test]
    fn test_auto_names() {
        let mut manager = ReferenceManager::new();
        let first = manager.add(vec![], AddOptions::default()).unwrap();
        let second = manager.add(vec![], AddOptions::named("named")).unwrap();
        let third = manager.add(vec![], AddOptions::default()).unwrap();
        assert_eq!(first.source, "source_0");
        assert_eq!(second.source, "named");
        assert_eq!(third.source, "source_2");
        assert!(manager.source("source_0").unwrap().auto_named);
    }

    #[test]
    fn test_auto_name_collision_with_explicit_name() {
        let mut manager = ReferenceManager::new();
        manager.add(vec![], AddOptions::named("source_1")).unwrap();
        let err = manager.add(vec![], AddOptions::default()).unwrap_err();
        assert!(matches!(err, Error::DuplicateSourceName(name) if name == "source_1"));
    }

    #[test]
    fn test_explicit_duplicate_name() {
        let mut manager = ReferenceManager::new();
        manager.add(vec![], AddOptions::named("lab")).unwrap();
        assert!(manager.add(vec![], AddOptions::named("lab")).is_err());
    }

    #[test]
    fn test_priority_resolver_ties_pick_first() {
        let sources = vec![
            SourceInfo {
                name: "a".to_string(),
                priority: 1,
                record_ids: vec![],
                auto_named: false,
                metadata: Map::new(),
            },
            SourceInfo {
                name: "b".to_string(),
                priority: 1,
                record_ids: vec![],
                auto_named: false,
                metadata: Map::new(),
            },
        ];
        let x = Record::new("x").with_sources(["a"]);
        let y = Record::new("y").with_sources(["b"]);
        assert_eq!(priority_resolver(&[&x, &y], &sources), 0);

        let z = Record::new("z").with_sources(["unknown"]);
        assert_eq!(priority_resolver(&[&z, &x], &sources), 1);
    }

    #[test]
    fn test_bad_resolver_leaves_records_untouched() {
        let mut manager = ReferenceManager::new();
        manager
            .add(
                vec![json!({"DOI": "10.1/a"}), json!({"DOI": "10.1/A"})],
                AddOptions::named("lab"),
            )
            .unwrap();
        let err = manager
            .deduplicate_with(&GroupingOptions::default(), |_, _| 7)
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_output_hooks() {
        let mut manager = ReferenceManager::new();
        manager
            .add(
                vec![json!({"id": "a", "title": "Only", "DOI": "10.1/a"})],
                AddOptions::named("lab"),
            )
            .unwrap();
        let options = OutputOptions::default()
            .with_custom_fields(|_| {
                let mut fields = Map::new();
                fields.insert("foo".to_string(), json!("bar"));
                fields
            })
            .with_transform(|mut entry| {
                entry.html = "bla".to_string();
                entry
            });
        let entries = manager.output(&BasicFormatter::default(), &options).unwrap();
        assert_eq!(entries[0].custom_field("foo"), Some(&json!("bar")));
        assert_eq!(entries[0].html, "bla");
        assert_eq!(entries[0].id, "doi:10.1/a");
        assert_eq!(entries[0].props["title"], "Only");
    }

    #[test]
    fn test_reserved_custom_fields_are_ignored() {
        let mut manager = ReferenceManager::new();
        manager
            .add(vec![json!({"title": "Only", "DOI": "10.1/a"})], AddOptions::named("lab"))
            .unwrap();
        let options = OutputOptions::default().with_custom_fields(|_| {
            let mut fields = Map::new();
            fields.insert("id".to_string(), json!("overridden"));
            fields.insert("order".to_string(), json!(99));
            fields.insert("extra".to_string(), json!(true));
            fields
        });
        let entries = manager.output(&BasicFormatter::default(), &options).unwrap();
        assert_eq!(entries[0].id, "doi:10.1/a");
        assert_eq!(entries[0].order, 0);
        assert_eq!(entries[0].custom.len(), 1);

        let value = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(value["id"], "doi:10.1/a");
        assert_eq!(value["extra"], true);
    }

    #[test]
    fn test_numeric_ids_are_parsed() {
        let mut manager = ReferenceManager::new();
        let report = manager
            .add(
                vec![
                    json!({"id": 1, "title": "Numbered", "DOI": "10.1/n"}),
                    json!({"id": "two", "title": "Named"}),
                ],
                AddOptions::named("file"),
            )
            .unwrap();
        assert_eq!(report.parsed, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(manager.records()[0].id, "1");
    }

    #[test]
    fn test_identity_ids_repeat_until_deduplicated() {
        let mut manager = ReferenceManager::new();
        manager
            .add(
                vec![
                    json!({"title": "First copy", "DOI": "10.1/same"}),
                    json!({"title": "Second copy", "DOI": "10.1/SAME"}),
                ],
                AddOptions::named("lab"),
            )
            .unwrap();
        let entries = manager
            .output(&BasicFormatter::default(), &OutputOptions::default())
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, entries[1].id);

        manager.deduplicate(&GroupingOptions::default()).unwrap();
        let entries = manager
            .output(&BasicFormatter::default(), &OutputOptions::default())
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "doi:10.1/same");
    }

    struct DroppingFormatter;

    impl Formatter for DroppingFormatter {
        fn format(&self, _: &[Record], _: &str, _: &str) -> Result<Vec<FormattedEntry>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_formatter_must_cover_every_record() {
        let mut manager = ReferenceManager::new();
        manager
            .add(vec![json!({"title": "x"})], AddOptions::named("lab"))
            .unwrap();
        let err = manager
            .output(&DroppingFormatter, &OutputOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
    }
}
