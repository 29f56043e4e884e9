//! # Citemerge
//!
//! Aggregates bibliographic records from several independent origins
//! (identifier lists, bibliography files, registry lookups), merges them into a
//! single canonical set and exports stably ordered, deduplicated entries that
//! remember which origins contributed them.
//!
//! ## Features
//!
//! - Comparator pipeline with tri-state verdicts (DOI equality, fuzzy titles)
//! - Transitive duplicate grouping backed by a disjoint-set forest
//! - Priority-based conflict resolution with provenance tracking
//! - Identity-keyed sources with per-item cache staleness checks
//! - Concurrent source loading with per-source failure reporting
//!
//! ## Example
//!
//! ```rust,ignore
//! use citemerge::services::{AddOptions, ReferenceManager};
//!
//! let mut manager = ReferenceManager::new();
//! manager.add(batch_a, AddOptions::named("lab").with_priority(2))?;
//! manager.add(batch_b, AddOptions::named("crossref"))?;
//! manager.deduplicate(&GroupingOptions::default())?;
//! let entries = manager.output(&formatter, &OutputOptions::default())?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cache;
pub mod config;
pub mod fetch;
pub mod io;
pub mod models;
pub mod observability;
pub mod rendering;
pub mod services;
pub mod sources;

// Re-exports for convenience
pub use cache::{CacheEntry, CacheGateway, FileCache, MemoryCache};
pub use config::{CitemergeConfig, SourceConfig, SourceKind};
pub use fetch::{FetchError, HttpFetcher, OfflineFetcher, RecordFetcher};
pub use models::{FieldAccess, PublicationEntry, Record};
pub use rendering::{BasicFormatter, Formatter, StyleRegistry};
pub use services::{
    AddOptions, ComparatorPipeline, DeduplicationConfig, ExclusionRule, GroupingOptions,
    OutputOptions, ReferenceManager, Verdict, group_duplicates,
};
pub use sources::{
    AggregateSource, ExportContext, LoadOutcome, Source, SourceItem, SourceLoader, SourceOptions,
    load_all,
};

/// Error type for citemerge operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Fatal |
/// |---------|-------------|-------|
/// | `InvalidInput` | Bad configuration values, unknown locale, bad regex | yes |
/// | `OperationFailed` | I/O errors, poisoned locks, formatter contract violations | yes |
/// | `ParseFailure` | A raw entry cannot be turned into a record | no, entry skipped |
/// | `NotFound` | An identifier resolves to nothing upstream | no, item skipped |
/// | `InvalidComparatorOutcome` | A comparator returned something other than true/false/null | yes |
/// | `EmptyPipeline` | Comparing with zero comparators | yes |
/// | `MissingSourceName` | Constructing a source with an empty name | yes |
/// | `InvalidItemType` | Raw source input has the wrong shape for its variant | yes |
/// | `TransientFetchFailure` | Network or upstream failure | no, item skipped |
/// | `DuplicateSourceName` | Registering a source name twice | yes |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A raw batch entry could not be turned into a record.
    #[error("could not parse entry from '{origin}': {detail}")]
    ParseFailure {
        /// Source name or file the entry came from.
        origin: String,
        /// Parser message.
        detail: String,
    },

    /// An identifier resolved to nothing upstream.
    #[error("not found: {0}")]
    NotFound(String),

    /// A comparator produced a value outside {true, false, null}.
    #[error("invalid outcome {outcome} of comparator '{comparator}': expected true, false or null")]
    InvalidComparatorOutcome {
        /// Name of the offending comparator.
        comparator: String,
        /// The rejected outcome, rendered as JSON.
        outcome: String,
    },

    /// A comparison was requested with zero comparators.
    #[error("comparator pipeline is empty: provide at least one comparator")]
    EmptyPipeline,

    /// A source was constructed without a name.
    #[error("every source needs a non-empty name")]
    MissingSourceName,

    /// Raw input for a source had the wrong item type.
    #[error("invalid item for source '{source_name}': {detail}")]
    InvalidItemType {
        /// Name of the source being built.
        source_name: String,
        /// What was wrong with the item.
        detail: String,
    },

    /// Retrieval failed for a reason other than "not found".
    #[error("transient failure fetching '{target}': {cause}")]
    TransientFetchFailure {
        /// What was being fetched (DOI, registry path).
        target: String,
        /// The underlying cause.
        cause: String,
    },

    /// A source name was registered twice.
    #[error("source name '{0}' is already registered")]
    DuplicateSourceName(String),
}

impl Error {
    /// Returns true for errors that only affect a single record.
    ///
    /// Callers iterating over many records log and skip these instead of
    /// aborting the whole batch.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ParseFailure { .. } | Self::NotFound(_) | Self::TransientFetchFailure { .. }
        )
    }
}

/// Result type alias for citemerge operations.
pub type Result<T> = std::result::Result<T, Error>;
