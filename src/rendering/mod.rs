//! Bibliography rendering.
//!
//! The reference manager and sources treat rendering as an opaque
//! collaborator behind the [`Formatter`] trait. [`BasicFormatter`] covers
//! the built-in styles; full CSL processing can be plugged in through the
//! same trait.

mod basic;
mod styles;

pub use basic::{BasicFormatter, escape_html};
pub use styles::{
    BUILTIN_STYLES, CUSTOM_STYLE, DEFAULT_LOCALE, DEFAULT_STYLE, SUPPORTED_LOCALES, StyleRegistry,
    Terms, check_locale,
};

use crate::Result;
use crate::models::Record;

/// One rendered record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormattedEntry {
    /// Index of the record in the input slice.
    pub index: usize,
    /// Record id.
    pub id: String,
    /// Plain-text bibliography entry.
    pub text: String,
    /// HTML bibliography entry.
    pub html: String,
    /// In-text citation.
    pub citation: String,
    /// BibTeX rendering.
    pub bibtex: String,
}

/// Renders a batch of records.
pub trait Formatter: Send + Sync {
    /// Renders `records` and returns them in bibliography order.
    ///
    /// Every input index must appear exactly once in the result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for unknown styles or
    /// unsupported locales.
    fn format(&self, records: &[Record], style: &str, locale: &str)
    -> Result<Vec<FormattedEntry>>;
}
