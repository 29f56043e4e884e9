//! Exclusion rules applied while records are added.
//!
//! An item is excluded when ANY rule matches. Rules are evaluated through
//! [`FieldAccess`] so the same rules work for parsed records and for source
//! items that have not been fetched yet.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::FieldAccess;
use crate::{Error, Result};

/// Custom exclusion predicate; returns true to exclude.
pub type FieldPredicate = Arc<dyn Fn(&dyn FieldAccess) -> bool + Send + Sync>;

/// A single exclusion rule.
#[derive(Clone)]
pub enum ExclusionRule {
    /// Excludes items for which the predicate returns true.
    Predicate(FieldPredicate),
    /// Excludes items whose field value is one of `values`.
    FieldValues {
        /// CSL field name (`"DOI"`, `"type"`, ...).
        field: String,
        /// Values that cause exclusion.
        values: Vec<String>,
    },
    /// Excludes items whose field value matches `pattern`.
    FieldPattern {
        /// CSL field name.
        field: String,
        /// Pattern searched for anywhere in the value.
        pattern: Regex,
    },
    /// Excludes items published before `before` or after `after`.
    ///
    /// Items without a parseable year are kept.
    YearRange {
        /// Earliest year kept.
        before: Option<i32>,
        /// Latest year kept.
        after: Option<i32>,
    },
}

impl ExclusionRule {
    /// Creates a predicate rule.
    pub fn predicate<F>(func: F) -> Self
    where
        F: Fn(&dyn FieldAccess) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(func))
    }

    /// Creates a field-values rule.
    pub fn field_values<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::FieldValues {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a field-pattern rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the pattern does not compile.
    pub fn field_pattern(field: impl Into<String>, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::InvalidInput(format!("Invalid exclusion pattern: {e}")))?;
        Ok(Self::FieldPattern {
            field: field.into(),
            pattern,
        })
    }

    /// Creates a year-range rule.
    #[must_use]
    pub const fn year_range(before: Option<i32>, after: Option<i32>) -> Self {
        Self::YearRange { before, after }
    }

    /// Returns true if the rule excludes `item`.
    #[must_use]
    pub fn matches(&self, item: &dyn FieldAccess) -> bool {
        match self {
            Self::Predicate(func) => func(item),
            Self::FieldValues { field, values } => item
                .field(field)
                .is_some_and(|value| values.iter().any(|v| *v == value)),
            Self::FieldPattern { field, pattern } => item
                .field(field)
                .is_some_and(|value| pattern.is_match(&value)),
            Self::YearRange { before, after } => item.year().is_some_and(|year| {
                before.is_some_and(|b| year < b) || after.is_some_and(|a| year > a)
            }),
        }
    }
}

impl fmt::Debug for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::FieldValues { field, values } => f
                .debug_struct("FieldValues")
                .field("field", field)
                .field("values", values)
                .finish(),
            Self::FieldPattern { field, pattern } => f
                .debug_struct("FieldPattern")
                .field("field", field)
                .field("pattern", &pattern.as_str())
                .finish(),
            Self::YearRange { before, after } => f
                .debug_struct("YearRange")
                .field("before", before)
                .field("after", after)
                .finish(),
        }
    }
}

/// Returns true if any rule excludes `item`.
#[must_use]
pub fn is_excluded(item: &dyn FieldAccess, rules: &[ExclusionRule]) -> bool {
    rules.iter().any(|rule| rule.matches(item))
}

/// Serialized form of an exclusion rule, as written in config files.
///
/// ```toml
/// exclude = [
///   { field = "DOI", values = ["10.31234/osf.io/qjfpe"] },
///   { field = "title", regexp = "^Erratum" },
///   { before = 2010, after = 2020 },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExclusionConfig {
    /// See [`ExclusionRule::FieldValues`].
    FieldValues {
        /// Field name.
        field: String,
        /// Excluded values.
        values: Vec<String>,
    },
    /// See [`ExclusionRule::FieldPattern`].
    FieldPattern {
        /// Field name.
        field: String,
        /// Regular expression.
        regexp: String,
    },
    /// See [`ExclusionRule::YearRange`].
    YearRange {
        /// Earliest year kept.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before: Option<i32>,
        /// Latest year kept.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<i32>,
    },
}

impl TryFrom<&ExclusionConfig> for ExclusionRule {
    type Error = Error;

    fn try_from(config: &ExclusionConfig) -> Result<Self> {
        match config {
            ExclusionConfig::FieldValues { field, values } => {
                Ok(Self::field_values(field.clone(), values.iter().cloned()))
            },
            ExclusionConfig::FieldPattern { field, regexp } => {
                Self::field_pattern(field.clone(), regexp)
            },
            ExclusionConfig::YearRange {
                before: None,
                after: None,
            } => Err(Error::InvalidInput(
                "Exclusion rule needs `field` with `values` or `regexp`, or `before`/`after`"
                    .to_string(),
            )),
            ExclusionConfig::YearRange { before, after } => {
                Ok(Self::year_range(*before, *after))
            },
        }
    }
}

/// Compiles a list of configured rules.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for the first malformed rule.
pub fn compile_rules(configs: &[ExclusionConfig]) -> Result<Vec<ExclusionRule>> {
    configs.iter().map(ExclusionRule::try_from).collect()
}
