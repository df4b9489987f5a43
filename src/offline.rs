//! Offline artifact cache.
//!
//! Staging environments may pre-stage artifacts into a well-known directory
//! before the process starts, keyed by the same digest scheme the online
//! store uses. This backend only reads: it never writes and never contacts
//! a network. A missing key is not an error here; the facade decides what
//! absence means.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::key::entry_key;
use crate::store::PAYLOAD_FILE;

/// Read-only lookup over pre-staged artifacts.
#[derive(Debug, Clone)]
pub struct OfflineCache {
    root: PathBuf,
}

impl OfflineCache {
    /// Create an offline cache over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The pre-staged directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `root` holds a usable pre-staged cache at all.
    ///
    /// True when the directory exists and contains at least one entry-shaped
    /// subdirectory (a key directory with a payload file). Queried once by
    /// the selector, not per URI.
    pub fn available(root: &Path) -> bool {
        let Ok(dir) = fs::read_dir(root) else {
            return false;
        };

        for child in dir.flatten() {
            if child.path().join(PAYLOAD_FILE).is_file() {
                return true;
            }
        }
        false
    }

    /// Look up a pre-staged artifact by URI.
    pub fn lookup(&self, uri: &str) -> Result<Option<PathBuf>> {
        let key = entry_key(uri)?;
        let payload = self.root.join(&key).join(PAYLOAD_FILE);

        if payload.is_file() {
            debug!(uri, key, "offline cache hit");
            Ok(Some(payload))
        } else {
            debug!(uri, key, "offline cache miss");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DepotError;
    use tempfile::TempDir;

    const URI: &str = "https://vendor.example/agent.zip";

    fn stage(root: &Path, uri: &str, body: &[u8]) -> PathBuf {
        let key = entry_key(uri).unwrap();
        let dir = root.join(key);
        fs::create_dir_all(&dir).unwrap();
        let payload = dir.join(PAYLOAD_FILE);
        fs::write(&payload, body).unwrap();
        payload
    }

    #[test]
    fn available_false_for_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(!OfflineCache::available(&temp.path().join("nope")));
    }

    #[test]
    fn available_false_for_empty_dir() {
        let temp = TempDir::new().unwrap();
        assert!(!OfflineCache::available(temp.path()));
    }

    #[test]
    fn available_false_for_non_entry_content() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("README"), "not an entry").unwrap();
        assert!(!OfflineCache::available(temp.path()));
    }

    #[test]
    fn available_true_with_staged_entry() {
        let temp = TempDir::new().unwrap();
        stage(temp.path(), URI, b"agent bytes");
        assert!(OfflineCache::available(temp.path()));
    }

    #[test]
    fn lookup_finds_staged_artifact() {
        let temp = TempDir::new().unwrap();
        let staged = stage(temp.path(), URI, b"agent bytes");

        let cache = OfflineCache::new(temp.path());
        let found = cache.lookup(URI).unwrap().unwrap();

        assert_eq!(found, staged);
        assert_eq!(fs::read(found).unwrap(), b"agent bytes");
    }

    #[test]
    fn lookup_misses_unstaged_uri() {
        let temp = TempDir::new().unwrap();
        stage(temp.path(), URI, b"agent bytes");

        let cache = OfflineCache::new(temp.path());
        let other = cache.lookup("https://vendor.example/other.zip").unwrap();

        assert!(other.is_none());
    }

    #[test]
    fn lookup_rejects_invalid_uri() {
        let temp = TempDir::new().unwrap();
        let cache = OfflineCache::new(temp.path());

        let err = cache.lookup("not a uri").unwrap_err();
        assert!(matches!(err, DepotError::UriInvalid { .. }));
    }

    #[test]
    fn keys_match_the_online_scheme() {
        let temp = TempDir::new().unwrap();
        stage(temp.path(), "https://Vendor.Example:443/agent.zip", b"x");

        // Different spelling, same canonical key.
        let cache = OfflineCache::new(temp.path());
        assert!(cache.lookup(URI).unwrap().is_some());
    }
}
