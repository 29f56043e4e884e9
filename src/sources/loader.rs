//! Concurrent source loading.
//!
//! Loaders perform blocking network and file I/O, so each one runs on the
//! tokio blocking pool. Every loader is awaited; a failing or panicking
//! loader only affects its own outcome.

use super::Source;
use crate::{Error, Result};

/// A deferred source construction.
pub struct SourceLoader {
    name: String,
    load: Box<dyn FnOnce() -> Result<Source> + Send + 'static>,
}

impl SourceLoader {
    /// Wraps a loading closure under a display name.
    pub fn new<F>(name: impl Into<String>, load: F) -> Self
    where
        F: FnOnce() -> Result<Source> + Send + 'static,
    {
        Self {
            name: name.into(),
            load: Box::new(load),
        }
    }

    /// Returns the loader's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceLoader")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Result of one loader.
#[derive(Debug)]
pub struct LoadOutcome {
    /// Loader name.
    pub name: String,
    /// The loaded source or the reason it failed.
    pub result: Result<Source>,
}

/// Runs every loader concurrently and waits for all of them.
///
/// Outcomes are returned in input order regardless of completion order.
pub async fn load_all(loaders: Vec<SourceLoader>) -> Vec<LoadOutcome> {
    let handles: Vec<_> = loaders
        .into_iter()
        .map(|loader| {
            let SourceLoader { name, load } = loader;
            let handle = tokio::task::spawn_blocking(load);
            (name, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let result = handle.await.unwrap_or_else(|e| {
            Err(Error::OperationFailed {
                operation: "load_source".to_string(),
                cause: e.to_string(),
            })
        });
        match &result {
            Ok(source) => tracing::info!(source = %name, items = source.len(), "Loaded source"),
            Err(e) => {
                tracing::warn!(source = %name, error = %e, "Failed to load source");
                metrics::counter!("citemerge_source_failures_total").increment(1);
            },
        }
        outcomes.push(LoadOutcome { name, result });
    }
    outcomes
}
