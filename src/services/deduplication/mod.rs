//! Duplicate detection for bibliographic records.
//!
//! Two layers:
//! 1. **Comparator pipeline**: ordered comparators with tri-state verdicts,
//!    short-circuiting on the first decisive one
//! 2. **Equivalence grouping**: pairwise comparison with transitive merging
//!    over a disjoint-set forest
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    group_duplicates                      │
//! │  ┌────────────────────────────┐  ┌────────────────────┐  │
//! │  │ ComparatorPipeline         │  │ DisjointSet        │  │
//! │  │  DoiComparator (exact)     │  │ path compression   │  │
//! │  │  TitleComparator (≤ 3 ed.) │  │ union by size      │  │
//! │  │  custom comparators        │  │                    │  │
//! │  └────────────────────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use citemerge::models::Record;
//! use citemerge::services::{GroupingOptions, group_duplicates};
//!
//! let records = vec![
//!     Record::new("a").with_doi("10.1/x"),
//!     Record::new("b").with_doi("https://doi.org/10.1/X"),
//!     Record::new("c").with_title("Unrelated"),
//! ];
//! let grouping = group_duplicates(&records, &GroupingOptions::default()).unwrap();
//! assert_eq!(grouping.groups, vec![vec![0, 1], vec![2]]);
//! ```

mod comparator;
mod config;
mod distance;
mod grouping;

pub use comparator::{
    Comparator, ComparatorPipeline, DoiComparator, FnComparator, OutcomeComparator,
    TitleComparator, Verdict, compare,
};
pub use config::{DEFAULT_MAX_TITLE_DISTANCE, DEFAULT_TITLE_LENGTH, DeduplicationConfig};
pub use distance::{comparable_title, levenshtein};
pub use grouping::{DisjointSet, Grouping, GroupingOptions, group_duplicates};
