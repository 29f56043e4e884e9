//! Aggregation services.
//!
//! Duplicate detection lives in [`deduplication`]; the [`ReferenceManager`]
//! drives ingestion, deduplication and export on top of it.

pub mod deduplication;
mod manager;

pub use deduplication::{
    Comparator, ComparatorPipeline, DeduplicationConfig, DoiComparator, FnComparator, Grouping,
    GroupingOptions, OutcomeComparator, TitleComparator, Verdict, compare, group_duplicates,
};
pub use manager::{
    AddOptions, AddReport, CustomFields, DedupReport, ExclusionConfig, ExclusionRule,
    FieldPredicate, OutputOptions, ReferenceManager, SourceInfo, Transform, compile_rules,
    is_excluded, priority_resolver, record_priority,
};
