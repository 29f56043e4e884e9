//! Cache gateways for exported entries.
//!
//! Source items consult a [`CacheGateway`] before fetching and rendering a
//! record. Keys are source-scoped identity strings (`<source>/<identity>`).
//!
//! An entry is trusted only if:
//! - it was rendered with the same options (see [`render_fingerprint`]), and
//! - the item's current last-modified timestamp is not strictly newer than
//!   the timestamp the entry was generated from.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Result;
use crate::models::PublicationEntry;

/// A cached, exported entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Identity key of the item.
    pub id: String,
    /// The exported entry.
    pub data: PublicationEntry,
    /// Upstream last-modified timestamp (epoch ms) the entry was built from.
    #[serde(rename = "lastModified", default)]
    pub last_modified: Option<u64>,
    /// Fingerprint of the render options used.
    #[serde(default)]
    pub fingerprint: String,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        data: PublicationEntry,
        last_modified: Option<u64>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            data,
            last_modified,
            fingerprint: fingerprint.into(),
            stored_at: Utc::now(),
        }
    }

    /// Returns true if this entry can be reused for an item currently
    /// reporting `last_modified`, rendered with `fingerprint`.
    ///
    /// An item without a timestamp never forces a refresh. An item with a
    /// timestamp forces one when the entry has no timestamp or an older one.
    #[must_use]
    pub fn is_fresh_for(&self, last_modified: Option<u64>, fingerprint: &str) -> bool {
        if self.fingerprint != fingerprint {
            return false;
        }
        match last_modified {
            None => true,
            Some(current) => self.last_modified.is_some_and(|cached| current <= cached),
        }
    }
}

/// Key/value store for exported entries.
///
/// No multi-key transactions are assumed. Callers must not export the same
/// identity concurrently.
pub trait CacheGateway: Send + Sync {
    /// Returns the entry stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Stores `entry` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&self, key: &str, entry: CacheEntry) -> Result<()>;
}

/// Builds the cache key for an item of a source.
#[must_use]
pub fn cache_key(source: &str, identity: &str) -> String {
    format!("{source}/{identity}")
}

/// Fingerprints render options so that changing them invalidates entries.
///
/// # Example
///
/// ```rust
/// use citemerge::cache::render_fingerprint;
///
/// let a = render_fingerprint(&["apa", "en-US", "false"]);
/// assert_eq!(a, render_fingerprint(&["apa", "en-US", "false"]));
/// assert_ne!(a, render_fingerprint(&["vancouver", "en-US", "false"]));
/// ```
#[must_use]
pub fn render_fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..8])
}

/// Hex SHA-256 digest of a key; used for file names.
#[must_use]
pub(crate) fn key_digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(last_modified: Option<u64>) -> CacheEntry {
        CacheEntry::new("doi:10.1/x", PublicationEntry::default(), last_modified, "fp")
    }

    #[test]
    fn test_fresh_when_timestamp_unchanged() {
        assert!(entry(Some(100)).is_fresh_for(Some(100), "fp"));
        assert!(entry(Some(100)).is_fresh_for(Some(50), "fp"));
    }

    #[test]
    fn test_stale_when_timestamp_newer() {
        assert!(!entry(Some(100)).is_fresh_for(Some(101), "fp"));
        assert!(!entry(None).is_fresh_for(Some(1), "fp"));
    }

    #[test]
    fn test_missing_timestamp_never_forces_refresh() {
        assert!(entry(None).is_fresh_for(None, "fp"));
        assert!(entry(Some(100)).is_fresh_for(None, "fp"));
    }

    #[test]
    fn test_fingerprint_change_is_stale() {
        assert!(!entry(Some(100)).is_fresh_for(Some(100), "other"));
    }

    #[test]
    fn test_cache_key_and_digest() {
        assert_eq!(cache_key("lab", "doi:10.1/x"), "lab/doi:10.1/x");
        assert_eq!(key_digest("lab/doi:10.1/x").len(), 64);
    }

    #[test]
    fn test_entry_uses_last_modified_on_the_wire() {
        let value = serde_json::to_value(entry(Some(7))).unwrap();
        assert_eq!(value["lastModified"], 7);
        assert_eq!(value["data"]["order"], 0);
    }
}
