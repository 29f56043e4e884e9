//! Merge command handler.

use std::path::PathBuf;

use anyhow::Result;
use citemerge::config::CitemergeConfig;
use citemerge::services::{
    AddOptions, GroupingOptions, OutputOptions, ReferenceManager, compile_rules,
};
use citemerge::sources::ExportContext;

use super::{build_fetcher, build_formatter, load_sources, write_entries};

/// Executes the merge command.
///
/// Every source's records are added to one reference manager with the
/// source's priority and exclusions, deduplicated and written out.
pub fn cmd_merge(
    config: &CitemergeConfig,
    format: &str,
    output: Option<PathBuf>,
    offline: bool,
) -> Result<()> {
    let fetcher = build_fetcher(config, offline);
    let (formatter, style) = build_formatter(config)?;
    let sources = load_sources(config, &fetcher)?;

    let ctx = ExportContext::new(fetcher.as_ref(), &formatter)
        .with_style(&style, &config.locale)
        .with_skip_without_bibtex_or_doi(config.skip_without_bibtex_or_doi);

    let mut manager = ReferenceManager::new();
    for (source_config, source) in &sources {
        let records = source.resolve_records(&ctx)?;
        let options = compile_rules(&source_config.exclude)?.into_iter().fold(
            AddOptions::named(source.name()).with_priority(source.priority()),
            AddOptions::with_exclusion,
        );
        let report = manager.add_records(records, options)?;
        eprintln!(
            "{}: {} added, {} excluded",
            report.source, report.added, report.excluded
        );
    }

    if config.deduplication.enabled {
        let report = manager.deduplicate(&GroupingOptions::from_config(&config.deduplication))?;
        eprintln!(
            "Deduplicated {} records into {} ({} comparisons)",
            report.before, report.after, report.comparisons
        );
    }

    let options = OutputOptions::default()
        .with_style(style.as_str())
        .with_locale(config.locale.as_str());
    let entries = manager.output(&formatter, &options)?;
    write_entries(&entries, format, output.as_deref())
}
