//! Exported entry type.
//!
//! This is the only shape handed to downstream consumers: the reference
//! manager's `output()` and a source's per-item export both produce it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A rendered, provenance-enriched bibliography entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationEntry {
    /// Identity key of the surviving record.
    pub id: String,
    /// Names of the origins that contributed this entry, in first-seen order.
    pub sources: Vec<String>,
    /// Publication year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Position in the rendered bibliography (zero-based, contiguous).
    pub order: usize,
    /// Plain-text bibliography entry.
    pub text: String,
    /// HTML bibliography entry.
    pub html: String,
    /// In-text citation.
    pub citation: String,
    /// BibTeX rendering.
    pub bibtex: String,
    /// The structured record as CSL-JSON.
    pub props: Value,
    /// Fields added by a custom-fields hook.
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl PublicationEntry {
    /// Field names serialized by the entry itself; custom fields may not use
    /// them.
    pub const RESERVED_FIELDS: &'static [&'static str] = &[
        "id", "sources", "year", "order", "text", "html", "citation", "bibtex", "props",
    ];

    /// Returns true if `name` is one of [`Self::RESERVED_FIELDS`].
    #[must_use]
    pub fn is_reserved_field(name: &str) -> bool {
        Self::RESERVED_FIELDS.contains(&name)
    }

    /// Returns a custom field by name.
    #[must_use]
    pub fn custom_field(&self, name: &str) -> Option<&Value> {
        self.custom.get(name)
    }
}
