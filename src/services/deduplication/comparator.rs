//! Comparators and the comparator pipeline.
//!
//! A comparator looks at two records along one dimension and returns a
//! [`Verdict`]. The pipeline applies comparators in order and stops at the
//! first decisive verdict; if every comparator is indeterminate the records
//! are presumed distinct.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::config::{DEFAULT_MAX_TITLE_DISTANCE, DEFAULT_TITLE_LENGTH, DeduplicationConfig};
use super::distance::{comparable_title, levenshtein};
use crate::models::Record;
use crate::{Error, Result};

/// Outcome of comparing two records along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The records describe the same work.
    Equal,
    /// The records describe different works.
    Distinct,
    /// This comparator cannot tell (missing data).
    Indeterminate,
}

impl Verdict {
    /// Returns true for `Equal` and `Distinct`.
    #[must_use]
    pub const fn is_decisive(self) -> bool {
        !matches!(self, Self::Indeterminate)
    }

    /// Maps `Some(true)`, `Some(false)` and `None` onto verdicts.
    #[must_use]
    pub const fn from_option(outcome: Option<bool>) -> Self {
        match outcome {
            Some(true) => Self::Equal,
            Some(false) => Self::Distinct,
            None => Self::Indeterminate,
        }
    }

    /// Validates a loosely typed outcome (`true`, `false` or `null`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidComparatorOutcome`] for any other value.
    pub fn from_outcome(comparator: &str, outcome: &Value) -> Result<Self> {
        match outcome {
            Value::Bool(true) => Ok(Self::Equal),
            Value::Bool(false) => Ok(Self::Distinct),
            Value::Null => Ok(Self::Indeterminate),
            other => Err(Error::InvalidComparatorOutcome {
                comparator: comparator.to_string(),
                outcome: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "equal"),
            Self::Distinct => write!(f, "distinct"),
            Self::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Compares two records along a single dimension.
pub trait Comparator: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Compares two records.
    ///
    /// # Errors
    ///
    /// Returns an error if the comparator produced an invalid outcome.
    fn compare(&self, a: &Record, b: &Record) -> Result<Verdict>;
}

/// Exact equality of normalized DOIs.
///
/// Indeterminate if either record lacks a DOI.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoiComparator;

impl Comparator for DoiComparator {
    fn name(&self) -> &str {
        "doi"
    }

    fn compare(&self, a: &Record, b: &Record) -> Result<Verdict> {
        Ok(match (a.comparable_doi(), b.comparable_doi()) {
            (Some(x), Some(y)) => Verdict::from_option(Some(x == y)),
            _ => Verdict::Indeterminate,
        })
    }
}

/// Bounded edit distance between truncated, lowercased titles.
///
/// Indeterminate if either record lacks a title.
#[derive(Debug, Clone, Copy)]
pub struct TitleComparator {
    /// Largest distance that still counts as equal.
    pub max_distance: usize,
    /// Number of leading characters compared.
    pub length: usize,
}

impl TitleComparator {
    /// Creates a title comparator.
    #[must_use]
    pub const fn new(max_distance: usize, length: usize) -> Self {
        Self {
            max_distance,
            length,
        }
    }
}

impl Default for TitleComparator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TITLE_DISTANCE, DEFAULT_TITLE_LENGTH)
    }
}

impl Comparator for TitleComparator {
    fn name(&self) -> &str {
        "title"
    }

    fn compare(&self, a: &Record, b: &Record) -> Result<Verdict> {
        let (Some(x), Some(y)) = (non_empty(a.title.as_deref()), non_empty(b.title.as_deref()))
        else {
            return Ok(Verdict::Indeterminate);
        };
        let distance = levenshtein(
            &comparable_title(x, self.length),
            &comparable_title(y, self.length),
        );
        Ok(Verdict::from_option(Some(distance <= self.max_distance)))
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.is_empty())
}

/// Comparator backed by a closure returning a [`Verdict`].
pub struct FnComparator<F> {
    name: String,
    func: F,
}

impl<F> FnComparator<F>
where
    F: Fn(&Record, &Record) -> Verdict + Send + Sync,
{
    /// Wraps a closure as a named comparator.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Comparator for FnComparator<F>
where
    F: Fn(&Record, &Record) -> Verdict + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, a: &Record, b: &Record) -> Result<Verdict> {
        Ok((self.func)(a, b))
    }
}

/// Comparator backed by a closure returning a loosely typed JSON outcome.
///
/// Useful for comparators defined outside Rust's type system (scripted or
/// configured); every outcome is validated with [`Verdict::from_outcome`].
pub struct OutcomeComparator<F> {
    name: String,
    func: F,
}

impl<F> OutcomeComparator<F>
where
    F: Fn(&Record, &Record) -> Value + Send + Sync,
{
    /// Wraps a closure as a named comparator.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Comparator for OutcomeComparator<F>
where
    F: Fn(&Record, &Record) -> Value + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, a: &Record, b: &Record) -> Result<Verdict> {
        Verdict::from_outcome(&self.name, &(self.func)(a, b))
    }
}

/// Applies comparators in order and returns the first decisive verdict.
///
/// Returns `false` (distinct) when every comparator is indeterminate.
///
/// # Errors
///
/// Returns [`Error::EmptyPipeline`] for an empty comparator list and
/// propagates [`Error::InvalidComparatorOutcome`] from comparators.
pub fn compare(a: &Record, b: &Record, comparators: &[Arc<dyn Comparator>]) -> Result<bool> {
    if comparators.is_empty() {
        return Err(Error::EmptyPipeline);
    }
    for comparator in comparators {
        match comparator.compare(a, b)? {
            Verdict::Equal => return Ok(true),
            Verdict::Distinct => return Ok(false),
            Verdict::Indeterminate => {},
        }
    }
    Ok(false)
}

/// An ordered, non-empty list of comparators.
///
/// The default pipeline compares normalized DOIs, then truncated titles.
#[derive(Clone)]
pub struct ComparatorPipeline {
    comparators: Vec<Arc<dyn Comparator>>,
}

impl ComparatorPipeline {
    /// Creates a pipeline from comparators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPipeline`] if `comparators` is empty.
    pub fn new(comparators: Vec<Arc<dyn Comparator>>) -> Result<Self> {
        if comparators.is_empty() {
            return Err(Error::EmptyPipeline);
        }
        Ok(Self { comparators })
    }

    /// Builds the default pipeline with thresholds from `config`.
    #[must_use]
    pub fn from_config(config: &DeduplicationConfig) -> Self {
        Self {
            comparators: vec![
                Arc::new(DoiComparator),
                Arc::new(TitleComparator::new(
                    config.max_title_distance,
                    config.title_length,
                )),
            ],
        }
    }

    /// Appends a comparator after the existing ones.
    #[must_use]
    pub fn with_comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparators.push(comparator);
        self
    }

    /// Compares two records; `true` means duplicate.
    ///
    /// # Errors
    ///
    /// Propagates comparator errors.
    pub fn compare(&self, a: &Record, b: &Record) -> Result<bool> {
        compare(a, b, &self.comparators)
    }

    /// Returns the comparator names in evaluation order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.comparators.iter().map(|c| c.name()).collect()
    }

    /// Returns the number of comparators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.comparators.len()
    }

    /// Always false; pipelines are non-empty by construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comparators.is_empty()
    }
}

impl Default for ComparatorPipeline {
    fn default() -> Self {
        Self::from_config(&DeduplicationConfig::default())
    }
}

impl fmt::Debug for ComparatorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComparatorPipeline")
            .field("comparators", &self.names())
            .finish()
    }
}
