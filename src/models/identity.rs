//! Identity key derivation.
//!
//! An identity key names one work within a single origin. Keys are prefixed
//! by the scheme that produced them so that keys from different schemes never
//! collide:
//!
//! | Prefix | Derived from |
//! |--------|--------------|
//! | `doi:` | Normalized DOI |
//! | `slug:` | `<year>_<slug of the first 40 title characters>` |
//! | `key:` | Citation key of a bibliography entry |
//! | `path:` | Registry path of a work |
//! | `id:` | Generated token (last resort) |

use regex::Regex;
use std::sync::LazyLock;

/// Number of title characters that participate in slug keys.
pub const SLUG_TITLE_CHARS: usize = 40;

static DOI_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://(?:dx\.)?doi\.org/|doi:)").unwrap_or_else(|_| unreachable!())
});

/// Normalizes a DOI for comparison.
///
/// Lowercases, trims and strips resolver prefixes. Returns `None` for
/// DOIs that are empty after normalization.
///
/// # Example
///
/// ```rust
/// use citemerge::models::normalize_doi;
///
/// assert_eq!(
///     normalize_doi("https://doi.org/10.18653/V1/N18-1108").as_deref(),
///     Some("10.18653/v1/n18-1108")
/// );
/// assert_eq!(normalize_doi("  "), None);
/// ```
#[must_use]
pub fn normalize_doi(doi: &str) -> Option<String> {
    let lowered = doi.trim().to_lowercase();
    let stripped = DOI_PREFIX.replace(&lowered, "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Turns free text into a lowercase, dash separated slug.
///
/// Alphanumeric characters are kept, whitespace and dashes collapse into a
/// single dash, everything else is dropped.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
    }
    slug
}

/// Builds the `slug:` key for a title and year.
#[must_use]
pub fn slug_key(title: &str, year: i32) -> String {
    let prefix: String = title.chars().take(SLUG_TITLE_CHARS).collect();
    format!("slug:{year}_{}", slugify(&prefix))
}

/// Returns a fresh `id:` key.
#[must_use]
pub fn generated_key() -> String {
    format!("id:{}", uuid::Uuid::now_v7().simple())
}

/// Derives an identity key from the usual descriptive fields.
///
/// Tries the DOI, then title and year, then the supplied fallback.
pub fn derive_identity(
    doi: Option<&str>,
    title: Option<&str>,
    year: Option<i32>,
    fallback: impl FnOnce() -> String,
) -> String {
    if let Some(doi) = doi.and_then(normalize_doi) {
        return format!("doi:{doi}");
    }
    match (title.map(str::trim).filter(|t| !t.is_empty()), year) {
        (Some(title), Some(year)) => slug_key(title, year),
        _ => fallback(),
    }
}
