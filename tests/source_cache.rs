//! Integration tests for per-item export through a cache gateway.
//!
//! A counting item stands in for upstream retrieval so that cache hits and
//! misses can be observed directly.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use citemerge::cache::{CacheGateway, FileCache, MemoryCache};
use citemerge::fetch::OfflineFetcher;
use citemerge::models::{FieldAccess, Record};
use citemerge::rendering::BasicFormatter;
use citemerge::sources::{AggregateSource, ExportContext, Source, SourceItem, SourceOptions};
use citemerge::{Error, Result};
use tempfile::TempDir;

#[derive(Debug)]
struct CountingItem {
    identity: String,
    title: String,
    stamp: Option<u64>,
    calls: Arc<AtomicUsize>,
}

impl FieldAccess for CountingItem {
    fn field(&self, name: &str) -> Option<String> {
        (name == "title").then(|| self.title.clone())
    }

    fn year(&self) -> Option<i32> {
        Some(2020)
    }
}

impl SourceItem for CountingItem {
    fn identity_key(&self) -> &str {
        &self.identity
    }

    fn last_modified(&self) -> Option<u64> {
        self.stamp
    }

    fn fetch_record(&self, _ctx: &ExportContext<'_>) -> Result<Option<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.title == "unreachable" {
            return Err(Error::TransientFetchFailure {
                target: self.identity.clone(),
                cause: "connection reset".to_string(),
            });
        }
        Ok(Some(
            Record::new(self.identity.as_str())
                .with_title(self.title.as_str())
                .with_year(2020),
        ))
    }
}

fn source(name: &str, stamp: Option<u64>, calls: &Arc<AtomicUsize>) -> Source {
    let items: Vec<Arc<dyn SourceItem>> = ["first", "second"]
        .iter()
        .map(|title| {
            Arc::new(CountingItem {
                identity: format!("slug:2020_{title}"),
                title: (*title).to_string(),
                stamp,
                calls: Arc::clone(calls),
            }) as Arc<dyn SourceItem>
        })
        .collect();
    Source::new(name, items, SourceOptions::default()).unwrap()
}

fn export_count(source: &Source, cache: &dyn CacheGateway, style: &str, refresh: bool) -> usize {
    let formatter = BasicFormatter::default();
    let ctx = ExportContext::new(&OfflineFetcher, &formatter)
        .with_cache(cache)
        .with_style(style, "en-US")
        .with_refresh(refresh);
    source.export_all(&ctx).unwrap().len()
}

#[test]
fn test_unchanged_timestamp_is_served_from_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = MemoryCache::new(16).unwrap();

    assert_eq!(export_count(&source("lab", Some(100), &calls), &cache, "apa", false), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);

    assert_eq!(export_count(&source("lab", Some(100), &calls), &cache, "apa", false), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_newer_timestamp_refetches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = MemoryCache::new(16).unwrap();

    export_count(&source("lab", Some(100), &calls), &cache, "apa", false);
    export_count(&source("lab", Some(200), &calls), &cache, "apa", false);
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    // The refreshed entries now carry the newer timestamp.
    export_count(&source("lab", Some(200), &calls), &cache, "apa", false);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_untimestamped_items_reuse_entries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = MemoryCache::new(16).unwrap();

    export_count(&source("dois", None, &calls), &cache, "apa", false);
    export_count(&source("dois", None, &calls), &cache, "apa", false);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // A timestamp appearing later forces a rebuild of untimestamped entries.
    export_count(&source("dois", Some(1), &calls), &cache, "apa", false);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_style_change_and_refresh_bypass_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = MemoryCache::new(16).unwrap();
    let lab = source("lab", Some(100), &calls);

    export_count(&lab, &cache, "apa", false);
    export_count(&lab, &cache, "vancouver", false);
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    export_count(&lab, &cache, "vancouver", true);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_cache_keys_are_scoped_by_source() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = MemoryCache::new(16).unwrap();

    export_count(&source("lab", Some(100), &calls), &cache, "apa", false);
    export_count(&source("mirror", Some(100), &calls), &cache, "apa", false);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(cache.len(), 4);
}

#[test]
fn test_file_cache_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    {
        let cache = FileCache::new(dir.path()).unwrap();
        export_count(&source("lab", Some(100), &calls), &cache, "apa", false);
    }
    let cache = FileCache::new(dir.path()).unwrap();
    let formatter = BasicFormatter::default();
    let ctx = ExportContext::new(&OfflineFetcher, &formatter).with_cache(&cache);
    let entries = source("lab", Some(100), &calls).export_all(&ctx).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(entries[1].id, "slug:2020_second");
    assert_eq!(entries[1].order, 1);
    assert_eq!(entries[1].sources, vec!["lab"]);
}

#[test]
fn test_transient_failure_skips_only_that_item() {
    let calls = Arc::new(AtomicUsize::new(0));
    let items: Vec<Arc<dyn SourceItem>> = ["ok", "unreachable"]
        .iter()
        .map(|title| {
            Arc::new(CountingItem {
                identity: format!("slug:2020_{title}"),
                title: (*title).to_string(),
                stamp: None,
                calls: Arc::clone(&calls),
            }) as Arc<dyn SourceItem>
        })
        .collect();
    let lab = Source::new("lab", items, SourceOptions::default()).unwrap();
    let cache = MemoryCache::new(16).unwrap();

    assert_eq!(export_count(&lab, &cache, "apa", false), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_aggregate_export_keeps_provenance() {
    let calls = Arc::new(AtomicUsize::new(0));
    let a = source("a", Some(1), &calls);
    let b = source("b", Some(1), &calls);
    let aggregate =
        AggregateSource::load("all", &[a, b], AggregateSource::default_options()).unwrap();

    let formatter = BasicFormatter::default();
    let entries = aggregate
        .export_all(&ExportContext::new(&OfflineFetcher, &formatter))
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].sources, vec!["a", "b"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
