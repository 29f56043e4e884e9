//! Identity-only merging of several sources.

use std::collections::HashMap;

use tracing::instrument;

use super::{ExportContext, Source, SourceEntry, SourceOptions};
use crate::Result;
use crate::models::PublicationEntry;

/// Several sources merged into one by identity key.
///
/// No fuzzy comparison happens here: an identity seen in a later source
/// only extends the provenance of the entry from the first source that
/// had it.
#[derive(Debug, Clone)]
pub struct AggregateSource {
    source: Source,
    contributors: Vec<String>,
}

impl AggregateSource {
    /// Options that keep each item's own provenance (no tagging).
    #[must_use]
    pub fn default_options() -> SourceOptions {
        SourceOptions::default().with_tag_items(false)
    }

    /// Merges `sources` in order.
    ///
    /// Items are not re-tagged with the aggregate's name unless
    /// `options.tag_items` is set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingSourceName`] for an empty name.
    #[instrument(skip(sources, options), fields(sources = sources.len()))]
    pub fn load(name: &str, sources: &[Source], options: SourceOptions) -> Result<Self> {
        let mut merged: Vec<SourceEntry> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        for source in sources {
            for entry in source.entries() {
                match slots.get(entry.identity_key()) {
                    Some(&slot) => merged[slot].add_source(source.name()),
                    None => {
                        slots.insert(entry.identity_key().to_string(), merged.len());
                        merged.push(entry.clone());
                    },
                }
            }
        }

        let shared = sources.iter().map(Source::len).sum::<usize>() - merged.len();
        tracing::info!(aggregate = name, items = merged.len(), shared, "Aggregated sources");
        Ok(Self {
            source: Source::from_entries(name, merged, options)?,
            contributors: sources.iter().map(|s| s.name().to_string()).collect(),
        })
    }

    /// Returns the merged source.
    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Consumes the aggregate, returning the merged source.
    #[must_use]
    pub fn into_source(self) -> Source {
        self.source
    }

    /// Names of the merged sources, in merge order.
    #[must_use]
    pub fn contributors(&self) -> &[String] {
        &self.contributors
    }

    /// Exports every merged item.
    ///
    /// # Errors
    ///
    /// See [`Source::export_all`].
    pub fn export_all(&self, ctx: &ExportContext<'_>) -> Result<Vec<PublicationEntry>> {
        self.source.export_all(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::load_identifiers;

    #[test]
    fn test_provenance_accumulates() {
        let a = load_identifiers("a", &["10.1/x", "10.1/y"], SourceOptions::default()).unwrap();
        let b = load_identifiers("b", &["10.1/X", "10.1/z"], SourceOptions::default()).unwrap();
        let c = load_identifiers("c", &["10.1/x"], SourceOptions::default()).unwrap();

        let aggregate =
            AggregateSource::load("all", &[a, b, c], AggregateSource::default_options()).unwrap();
        let source = aggregate.source();
        assert_eq!(source.len(), 3);
        assert_eq!(source.get("doi:10.1/x").unwrap().sources, vec!["a", "b", "c"]);
        assert_eq!(source.get("doi:10.1/z").unwrap().sources, vec!["b"]);
        assert_eq!(aggregate.contributors(), ["a", "b", "c"]);
        let ids: Vec<&str> = source.ids().collect();
        assert_eq!(ids, vec!["doi:10.1/x", "doi:10.1/y", "doi:10.1/z"]);
    }

    #[test]
    fn test_tagging_with_aggregate_name() {
        let a = load_identifiers("a", &["10.1/x"], SourceOptions::default()).unwrap();
        let aggregate = AggregateSource::load("all", &[a], SourceOptions::default()).unwrap();
        assert_eq!(
            aggregate.source().get("doi:10.1/x").unwrap().sources,
            vec!["a", "all"]
        );
    }

    #[test]
    fn test_empty_name() {
        assert!(AggregateSource::load("", &[], SourceOptions::default()).is_err());
    }
}
