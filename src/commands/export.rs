//! Export command handler.

use std::path::PathBuf;

use anyhow::{Context, Result};
use citemerge::cache::{CacheGateway, FileCache};
use citemerge::config::CitemergeConfig;
use citemerge::sources::{AggregateSource, ExportContext, Source};

use super::{build_fetcher, build_formatter, load_sources, write_entries};

/// Executes the export command.
///
/// Sources are merged by identity only and every item is exported through
/// the file cache when one is configured.
pub fn cmd_export(
    config: &CitemergeConfig,
    name: &str,
    format: &str,
    output: Option<PathBuf>,
    offline: bool,
    refresh: bool,
) -> Result<()> {
    let fetcher = build_fetcher(config, offline);
    let (formatter, style) = build_formatter(config)?;
    let sources: Vec<Source> = load_sources(config, &fetcher)?
        .into_iter()
        .map(|(_, source)| source)
        .collect();
    let aggregate = AggregateSource::load(name, &sources, AggregateSource::default_options())?;

    let cache = config
        .cache_dir
        .as_ref()
        .map(FileCache::new)
        .transpose()
        .context("failed to open cache directory")?;

    let mut ctx = ExportContext::new(fetcher.as_ref(), &formatter)
        .with_style(&style, &config.locale)
        .with_refresh(refresh || config.refresh)
        .with_skip_without_bibtex_or_doi(config.skip_without_bibtex_or_doi);
    if let Some(cache) = cache.as_ref() {
        ctx = ctx.with_cache(cache as &dyn CacheGateway);
    }

    let entries = aggregate.export_all(&ctx)?;
    eprintln!(
        "Exported {} of {} items from {}",
        entries.len(),
        aggregate.source().len(),
        aggregate.contributors().join(", ")
    );
    write_entries(&entries, format, output.as_deref())
}
