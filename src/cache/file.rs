//! Filesystem cache gateway.
//!
//! Stores one JSON document per key. File names are the SHA-256 digest of
//! the key, so arbitrary identity strings never escape the cache directory.

use std::fs;
use std::path::{Path, PathBuf};

use super::{CacheEntry, CacheGateway, key_digest};
use crate::{Error, Result};

/// Maximum size of a cache file (4MB).
const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// Directory-backed cache.
///
/// Writes go to a temporary file that is renamed into place, so readers
/// never observe a half-written entry. Unreadable or corrupt entries are
/// logged and treated as absent.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Opens (and creates if needed) a cache directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::OperationFailed {
            operation: "create_cache_dir".to_string(),
            cause: format!("{}: {e}", dir.display()),
        })?;
        Ok(Self { dir })
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key_digest(key)))
    }

    fn read_entry(path: &Path) -> Option<CacheEntry> {
        match fs::metadata(path) {
            Ok(meta) if meta.len() > MAX_FILE_SIZE => {
                tracing::warn!(
                    path = %path.display(),
                    size = meta.len(),
                    "Cache file exceeds size limit, ignoring"
                );
                return None;
            },
            Ok(_) => {},
            Err(_) => return None,
        }
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read cache file");
                return None;
            },
        };
        match serde_json::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt cache file, ignoring");
                None
            },
        }
    }
}

impl CacheGateway for FileCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(Self::read_entry(&self.entry_path(key)))
    }

    fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        let body = serde_json::to_vec(&entry).map_err(|e| Error::OperationFailed {
            operation: "serialize_cache_entry".to_string(),
            cause: e.to_string(),
        })?;

        fs::write(&tmp, body).map_err(|e| Error::OperationFailed {
            operation: "write_cache_entry".to_string(),
            cause: format!("{}: {e}", tmp.display()),
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::OperationFailed {
                operation: "write_cache_entry".to_string(),
                cause: format!("{}: {e}", path.display()),
            }
        })?;

        tracing::trace!(key, path = %path.display(), "Stored cache entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PublicationEntry;
    use tempfile::TempDir;

    fn entry(id: &str, last_modified: Option<u64>) -> CacheEntry {
        CacheEntry::new(id, PublicationEntry::default(), last_modified, "fp")
    }

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache")).unwrap();

        assert!(cache.get("lab/doi:10.1/x").unwrap().is_none());
        cache.set("lab/doi:10.1/x", entry("doi:10.1/x", Some(5))).unwrap();

        let stored = cache.get("lab/doi:10.1/x").unwrap().unwrap();
        assert_eq!(stored.id, "doi:10.1/x");
        assert_eq!(stored.last_modified, Some(5));
    }

    #[test]
    fn test_keys_with_slashes_stay_inside_dir() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        cache.set("../../etc/passwd", entry("x", None)).unwrap();

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        cache.set("k", entry("x", None)).unwrap();
        fs::write(cache.entry_path("k"), b"{not json").unwrap();

        assert!(cache.get("k").unwrap().is_none());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        FileCache::new(dir.path())
            .unwrap()
            .set("k", entry("x", Some(1)))
            .unwrap();

        let reopened = FileCache::new(dir.path()).unwrap();
        assert!(reopened.get("k").unwrap().is_some());
    }
}
