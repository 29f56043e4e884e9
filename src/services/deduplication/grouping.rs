//! Equivalence grouping of duplicate records.
//!
//! Pairwise comparison with transitive merging over a disjoint-set forest.
//! The candidate set shrinks as singletons are confirmed and, in
//! non-exhaustive mode, as members are merged.

use tracing::instrument;

use super::comparator::ComparatorPipeline;
use super::config::DeduplicationConfig;
use crate::Result;
use crate::models::Record;

/// Disjoint-set forest with path compression and union by size.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    /// Creates `n` singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    /// Returns the representative of `x`'s set.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merges the sets of `a` and `b`; returns the new representative.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return ra;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        big
    }

    /// Returns true if `a` and `b` are in the same set.
    pub fn same_set(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Returns the size of `x`'s set.
    pub fn set_size(&mut self, x: usize) -> usize {
        let root = self.find(x);
        self.size[root]
    }

    /// Returns all sets ordered by smallest member, members ascending.
    pub fn sets(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut slot_of_root = vec![usize::MAX; n];
        let mut sets: Vec<Vec<usize>> = Vec::new();
        for i in 0..n {
            let root = self.find(i);
            if slot_of_root[root] == usize::MAX {
                slot_of_root[root] = sets.len();
                sets.push(Vec::new());
            }
            sets[slot_of_root[root]].push(i);
        }
        sets
    }
}

/// Options for [`group_duplicates`].
#[derive(Debug, Clone)]
pub struct GroupingOptions {
    /// Comparators deciding whether two records are duplicates.
    pub pipeline: ComparatorPipeline,
    /// Keep merged members as candidates (closes transitive chains).
    pub exhaustive: bool,
}

impl GroupingOptions {
    /// Creates options with the given pipeline in exhaustive mode.
    #[must_use]
    pub const fn new(pipeline: ComparatorPipeline) -> Self {
        Self {
            pipeline,
            exhaustive: true,
        }
    }

    /// Builds options from deduplication settings.
    #[must_use]
    pub fn from_config(config: &DeduplicationConfig) -> Self {
        Self {
            pipeline: ComparatorPipeline::from_config(config),
            exhaustive: config.exhaustive,
        }
    }

    /// Sets the grouping mode.
    #[must_use]
    pub const fn with_exhaustive(mut self, exhaustive: bool) -> Self {
        self.exhaustive = exhaustive;
        self
    }
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self::new(ComparatorPipeline::default())
    }
}

/// Result of grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    /// Groups of record indices, in discovery order, members ascending.
    pub groups: Vec<Vec<usize>>,
    /// Number of pairwise comparisons performed.
    pub comparisons: usize,
}

impl Grouping {
    /// Number of records that were folded into another group member.
    #[must_use]
    pub fn merged(&self) -> usize {
        self.groups.iter().map(|g| g.len().saturating_sub(1)).sum()
    }
}

/// Partitions `records` into groups of duplicates.
///
/// Every index appears in exactly one group. In exhaustive mode the groups
/// are the connected components of the "duplicate" relation over all
/// candidate pairs; otherwise a record stops being a candidate after its
/// first merge, which may split transitive chains.
///
/// # Errors
///
/// Propagates comparator errors.
#[instrument(skip_all, fields(records = records.len(), exhaustive = options.exhaustive))]
pub fn group_duplicates(records: &[Record], options: &GroupingOptions) -> Result<Grouping> {
    let n = records.len();
    let mut forest = DisjointSet::new(n);
    let mut candidates = vec![true; n];
    let mut comparisons = 0usize;

    for a in 0..n {
        if !candidates[a] {
            continue;
        }
        for b in 0..n {
            if a == b || !candidates[b] || forest.same_set(a, b) {
                continue;
            }
            comparisons += 1;
            if options.pipeline.compare(&records[a], &records[b])? {
                forest.union(a, b);
                if !options.exhaustive {
                    candidates[b] = false;
                }
            }
        }
        if forest.set_size(a) == 1 {
            candidates[a] = false;
        }
    }

    let grouping = Grouping {
        groups: forest.sets(),
        comparisons,
    };
    tracing::debug!(
        groups = grouping.groups.len(),
        comparisons,
        "Grouped duplicate records"
    );
    Ok(grouping)
}
