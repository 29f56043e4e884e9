//! Command handlers module.
//!
//! - `merge.rs`: load, add, deduplicate and output through the reference manager
//! - `export.rs`: aggregate sources and export each item through the cache
//! - `config.rs`: configuration display

mod config;
mod export;
mod merge;

pub use config::cmd_config;
pub use export::cmd_export;
pub use merge::cmd_merge;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use citemerge::config::{CitemergeConfig, SourceConfig};
use citemerge::fetch::{HttpFetcher, OfflineFetcher, RecordFetcher};
use citemerge::io::{Format, formats};
use citemerge::models::PublicationEntry;
use citemerge::rendering::{BasicFormatter, StyleRegistry};
use citemerge::sources::{Source, load_all, source_loaders};

/// Builds the retrieval collaborator.
pub fn build_fetcher(config: &CitemergeConfig, offline: bool) -> Arc<dyn RecordFetcher> {
    if offline {
        Arc::new(OfflineFetcher)
    } else {
        Arc::new(HttpFetcher::new(config.http.clone()))
    }
}

/// Resolves the style (registering a custom template) and builds the
/// formatter for it.
pub fn build_formatter(config: &CitemergeConfig) -> Result<(BasicFormatter, String)> {
    let template = config.read_template()?;
    let mut registry = StyleRegistry::new();
    let style = registry.resolve(config.style.as_deref(), template.as_deref());
    Ok((BasicFormatter::new(registry), style))
}

/// Loads every configured source concurrently.
///
/// Sources that fail to load are reported and left out; the returned pairs
/// keep configuration order.
pub fn load_sources<'a>(
    config: &'a CitemergeConfig,
    fetcher: &Arc<dyn RecordFetcher>,
) -> Result<Vec<(&'a SourceConfig, Source)>> {
    if config.sources.is_empty() {
        bail!("no sources configured: add [[sources]] entries to the config file");
    }

    let loaders = source_loaders(&config.sources, fetcher)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start loader runtime")?;
    let outcomes = runtime.block_on(load_all(loaders));

    let mut loaded = Vec::with_capacity(outcomes.len());
    for (source_config, outcome) in config.sources.iter().zip(outcomes) {
        match outcome.result {
            Ok(source) => loaded.push((source_config, source)),
            Err(e) => eprintln!("Skipping source '{}': {e}", outcome.name),
        }
    }
    if loaded.is_empty() {
        bail!("every configured source failed to load");
    }
    Ok(loaded)
}

/// Writes entries as JSON or YAML to a file or stdout.
pub fn write_entries(
    entries: &[PublicationEntry],
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let format: Format = format.parse()?;
    if !format.supports_export() {
        bail!("cannot write entries as {format}; use json or yaml");
    }

    let mut sink = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            formats::create_export_sink(BufWriter::new(file), format)?
        },
        None => formats::create_export_sink(std::io::stdout(), format)?,
    };
    for entry in entries {
        sink.write(entry)?;
    }
    sink.finalize()?;
    Ok(())
}
