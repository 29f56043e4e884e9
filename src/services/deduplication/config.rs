//! Deduplication configuration.
//!
//! Controls the default comparator pipeline and the grouping mode.

use serde::Serialize;

/// Default number of title characters compared by the title comparator.
pub const DEFAULT_TITLE_LENGTH: usize = 30;

/// Default maximum edit distance between truncated titles.
pub const DEFAULT_MAX_TITLE_DISTANCE: usize = 3;

/// Configuration for duplicate detection.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `CITEMERGE_DEDUP_ENABLED` | bool | `true` | Run deduplication at all |
/// | `CITEMERGE_DEDUP_EXHAUSTIVE` | bool | `true` | Keep merged items as candidates |
/// | `CITEMERGE_DEDUP_TITLE_LENGTH` | usize | `30` | Title prefix length |
/// | `CITEMERGE_DEDUP_MAX_TITLE_DISTANCE` | usize | `3` | Maximum edit distance |
///
/// # Example
///
/// ```rust
/// use citemerge::services::DeduplicationConfig;
///
/// let config = DeduplicationConfig::default();
/// assert!(config.enabled);
/// assert!(config.exhaustive);
/// assert_eq!(config.title_length, 30);
/// assert_eq!(config.max_title_distance, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeduplicationConfig {
    /// Enable/disable deduplication.
    pub enabled: bool,

    /// Keep merged members as candidates so transitive chains are closed.
    pub exhaustive: bool,

    /// Number of leading title characters to compare.
    pub title_length: usize,

    /// Largest edit distance at which titles still count as equal.
    pub max_title_distance: usize,
}

impl DeduplicationConfig {
    /// Creates a new configuration from environment variables.
    ///
    /// Falls back to defaults for any unset or unparseable variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `CITEMERGE_DEDUP_*` overrides on top of `self`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        let flag = |name: &str, current: bool| {
            std::env::var(name)
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(current)
        };
        let number = |name: &str, current: usize| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(current)
        };

        Self {
            enabled: flag("CITEMERGE_DEDUP_ENABLED", self.enabled),
            exhaustive: flag("CITEMERGE_DEDUP_EXHAUSTIVE", self.exhaustive),
            title_length: number("CITEMERGE_DEDUP_TITLE_LENGTH", self.title_length),
            max_title_distance: number(
                "CITEMERGE_DEDUP_MAX_TITLE_DISTANCE",
                self.max_title_distance,
            ),
        }
    }

    /// Builder method to set enabled state.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the grouping mode.
    #[must_use]
    pub const fn with_exhaustive(mut self, exhaustive: bool) -> Self {
        self.exhaustive = exhaustive;
        self
    }

    /// Builder method to set the compared title length.
    #[must_use]
    pub const fn with_title_length(mut self, length: usize) -> Self {
        self.title_length = length;
        self
    }

    /// Builder method to set the maximum title distance.
    #[must_use]
    pub const fn with_max_title_distance(mut self, distance: usize) -> Self {
        self.max_title_distance = distance;
        self
    }
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exhaustive: true,
            title_length: DEFAULT_TITLE_LENGTH,
            max_title_distance: DEFAULT_MAX_TITLE_DISTANCE,
        }
    }
}
