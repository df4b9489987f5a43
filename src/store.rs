//! On-disk cache entry store.
//!
//! The store exclusively owns the cache directory layout: one subdirectory
//! per entry key containing the payload, a JSON metadata sidecar, and the
//! lease lock file. Downloads never write a final path directly; they stream
//! into a store-issued staging path and go through [`EntryStore::promote`],
//! which verifies integrity and swaps files with atomic renames. A reader
//! can therefore never observe a half-written payload.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::entry::{CacheEntry, Validator};
use crate::error::{DepotError, Result};
use crate::key::entry_key;
use crate::lease::Lease;

/// Payload file name inside an entry directory.
pub const PAYLOAD_FILE: &str = "payload";
/// Metadata sidecar file name.
const SIDECAR_FILE: &str = "entry.json";
/// Lease lock file name.
const LOCK_FILE: &str = ".lock";
/// Staging file name; transient, never exposed.
const STAGING_FILE: &str = "payload.part";

/// Storage for cached artifacts.
pub struct EntryStore {
    /// Root directory of the cache.
    root: PathBuf,
    /// Bounded wait when acquiring an entry lease.
    lock_wait: Duration,
}

/// An exclusive right to perform the sole in-flight fetch for one entry.
///
/// Issued by [`EntryStore::begin_fetch`]; consumed by
/// [`EntryStore::promote`] or [`EntryStore::release`]. Dropping it releases
/// the underlying cross-process lock either way.
#[derive(Debug)]
pub struct FetchLease {
    uri: String,
    dir: PathBuf,
    _lock: Lease,
}

impl FetchLease {
    /// The artifact URI this lease covers.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Where the download engine must stream the payload.
    pub fn staging_path(&self) -> PathBuf {
        self.dir.join(STAGING_FILE)
    }
}

impl EntryStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, lock_wait: Duration) -> Self {
        Self {
            root: root.into(),
            lock_wait,
        }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.entry_dir(key).join(PAYLOAD_FILE)
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.entry_dir(key).join(SIDECAR_FILE)
    }

    /// Look up the last known state of an entry. Never touches the network
    /// and never blocks on a lease.
    ///
    /// An entry is reported only when its sidecar parses and the payload
    /// file exists with exactly the recorded size; anything else (crash
    /// debris, torn promotion) is treated as absent.
    pub fn lookup(&self, uri: &str) -> Result<Option<CacheEntry>> {
        let key = entry_key(uri)?;
        self.load_entry(&key)
    }

    fn load_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let sidecar = self.sidecar_path(key);
        if !sidecar.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&sidecar)
            .with_context(|| format!("reading cache metadata {}", sidecar.display()))?;
        let mut entry: CacheEntry = match serde_json::from_str(&json) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "unreadable cache metadata, treating entry as absent");
                return Ok(None);
            }
        };

        // The sidecar records the path it was written under; trust the
        // store's current layout instead so a relocated root still resolves.
        entry.payload_path = self.payload_path(key);

        match fs::metadata(&entry.payload_path) {
            Ok(meta) if meta.len() == entry.size_bytes => Ok(Some(entry)),
            Ok(meta) => {
                warn!(
                    key,
                    expected = entry.size_bytes,
                    found = meta.len(),
                    "payload size mismatch, treating entry as absent"
                );
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }

    /// Acquire the exclusive fetch lease for an entry.
    ///
    /// Waits up to the configured bound for a contended lease, then fails
    /// with [`DepotError::Busy`].
    pub fn begin_fetch(&self, uri: &str) -> Result<FetchLease> {
        let key = entry_key(uri)?;
        let dir = self.entry_dir(&key);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache entry directory {}", dir.display()))?;

        let lock = match Lease::acquire(&dir.join(LOCK_FILE), self.lock_wait)? {
            Some(lock) => lock,
            None => {
                return Err(DepotError::Busy {
                    uri: uri.to_string(),
                })
            }
        };

        // A previous holder may have died mid-stream.
        let staging = dir.join(STAGING_FILE);
        if staging.exists() {
            debug!(key, "removing stale staging file");
            let _ = fs::remove_file(&staging);
        }

        Ok(FetchLease {
            uri: uri.to_string(),
            dir,
            _lock: lock,
        })
    }

    /// Atomically replace the entry's payload with the staged file.
    ///
    /// The staged bytes are re-hashed and compared against the hash computed
    /// during the transfer; a mismatch aborts the promotion with no visible
    /// entry mutation. On success the sidecar and payload are swapped in via
    /// rename and the lease is released.
    pub fn promote(
        &self,
        lease: FetchLease,
        validator: Validator,
        expected_sha256: &str,
    ) -> Result<CacheEntry> {
        let key = entry_key(&lease.uri)?;
        let staging = lease.staging_path();

        let (actual_sha256, size_bytes) = hash_file(&staging)
            .with_context(|| format!("hashing staged payload {}", staging.display()))?;

        if actual_sha256 != expected_sha256 {
            let _ = fs::remove_file(&staging);
            return Err(DepotError::IntegrityMismatch {
                uri: lease.uri.clone(),
                expected: expected_sha256.to_string(),
                actual: actual_sha256,
            });
        }

        let entry = CacheEntry::new(&lease.uri, self.payload_path(&key))
            .with_validator(validator)
            .with_size(size_bytes)
            .with_sha256(actual_sha256);

        let sidecar = self.sidecar_path(&key);
        let sidecar_staging = sidecar.with_extension("json.part");
        let json = serde_json::to_string_pretty(&entry).context("serializing cache metadata")?;
        fs::write(&sidecar_staging, json)
            .with_context(|| format!("writing cache metadata {}", sidecar_staging.display()))?;

        // Payload first, sidecar second: a crash in between leaves a
        // size-mismatched sidecar, which lookup treats as absent.
        fs::rename(&staging, entry.payload_path.as_path())
            .with_context(|| format!("promoting payload for {}", lease.uri))?;
        fs::rename(&sidecar_staging, &sidecar)
            .with_context(|| format!("promoting metadata for {}", lease.uri))?;

        debug!(key, size_bytes, "promoted cache entry");
        Ok(entry)
    }

    /// Record a confirmed revalidation without a payload transfer.
    ///
    /// Refreshes `cached_at` and adopts any validator tokens the origin sent
    /// alongside the 304. The payload and hash are untouched.
    pub fn touch(&self, lease: &FetchLease, validator: Option<Validator>) -> Result<Option<CacheEntry>> {
        let key = entry_key(&lease.uri)?;
        let mut entry = match self.load_entry(&key)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        entry.cached_at = chrono::Utc::now();
        if let Some(validator) = validator {
            if validator.etag.is_some() {
                entry.validator.etag = validator.etag;
            }
            if validator.last_modified.is_some() {
                entry.validator.last_modified = validator.last_modified;
            }
        }

        let sidecar = self.sidecar_path(&key);
        let sidecar_staging = sidecar.with_extension("json.part");
        let json = serde_json::to_string_pretty(&entry).context("serializing cache metadata")?;
        fs::write(&sidecar_staging, json)
            .with_context(|| format!("writing cache metadata {}", sidecar_staging.display()))?;
        fs::rename(&sidecar_staging, &sidecar)
            .with_context(|| format!("refreshing metadata for {}", lease.uri))?;

        Ok(Some(entry))
    }

    /// Release a lease without promotion, leaving any prior entry untouched.
    pub fn release(&self, lease: FetchLease) {
        let staging = lease.staging_path();
        if staging.exists() {
            let _ = fs::remove_file(&staging);
        }
    }

    /// Recompute the payload hash and compare it to the recorded one.
    pub fn verify(&self, entry: &CacheEntry) -> Result<bool> {
        let (actual, _) = hash_file(&entry.payload_path)
            .with_context(|| format!("hashing payload {}", entry.payload_path.display()))?;
        Ok(actual == entry.sha256)
    }

    /// List all entries, newest first.
    pub fn list(&self) -> Result<Vec<CacheEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.root)
            .with_context(|| format!("reading cache directory {}", self.root.display()))?
        {
            let dir_entry = dir_entry?;
            if !dir_entry.path().is_dir() {
                continue;
            }
            let key = dir_entry.file_name().to_string_lossy().to_string();
            if let Ok(Some(entry)) = self.load_entry(&key) {
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| b.cached_at.cmp(&a.cached_at));
        Ok(entries)
    }

    /// Remove every entry, returning how many were deleted.
    pub fn clear(&self) -> Result<usize> {
        let entries = self.list()?;
        let count = entries.len();

        for entry in &entries {
            if let Some(dir) = entry.payload_path.parent() {
                fs::remove_dir_all(dir)
                    .with_context(|| format!("removing cache entry {}", dir.display()))?;
            }
        }

        Ok(count)
    }

    /// Total payload bytes across all entries.
    pub fn total_size(&self) -> Result<u64> {
        Ok(self.list()?.iter().map(|e| e.size_bytes).sum())
    }
}

/// Stream-hash a file, returning the hex sha256 and the byte count.
fn hash_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((hex::encode(hasher.finalize()), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const URI: &str = "https://vendor.example/agent.zip";

    fn store_in(temp: &TempDir) -> EntryStore {
        EntryStore::new(temp.path(), Duration::from_millis(500))
    }

    fn stage_and_promote(store: &EntryStore, uri: &str, body: &[u8]) -> CacheEntry {
        let lease = store.begin_fetch(uri).unwrap();
        let mut staged = File::create(lease.staging_path()).unwrap();
        staged.write_all(body).unwrap();
        drop(staged);

        let sha = hex::encode(Sha256::digest(body));
        store.promote(lease, Validator::default(), &sha).unwrap()
    }

    #[test]
    fn lookup_absent_returns_none() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        assert!(store.lookup(URI).unwrap().is_none());
    }

    #[test]
    fn promote_then_lookup_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let promoted = stage_and_promote(&store, URI, b"agent bytes");

        let found = store.lookup(URI).unwrap().unwrap();
        assert_eq!(found.uri, URI);
        assert_eq!(found.size_bytes, 11);
        assert_eq!(found.sha256, promoted.sha256);
        assert_eq!(fs::read(&found.payload_path).unwrap(), b"agent bytes");
    }

    #[test]
    fn promote_rejects_hash_mismatch() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let lease = store.begin_fetch(URI).unwrap();
        fs::write(lease.staging_path(), b"agent bytes").unwrap();

        let err = store
            .promote(lease, Validator::default(), "not-the-hash")
            .unwrap_err();

        assert!(matches!(err, DepotError::IntegrityMismatch { .. }));
        assert!(store.lookup(URI).unwrap().is_none());
    }

    #[test]
    fn failed_promotion_keeps_prior_entry() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        stage_and_promote(&store, URI, b"version one");

        let lease = store.begin_fetch(URI).unwrap();
        fs::write(lease.staging_path(), b"version two").unwrap();
        let err = store
            .promote(lease, Validator::default(), "bogus")
            .unwrap_err();
        assert!(matches!(err, DepotError::IntegrityMismatch { .. }));

        let entry = store.lookup(URI).unwrap().unwrap();
        assert_eq!(fs::read(&entry.payload_path).unwrap(), b"version one");
    }

    #[test]
    fn begin_fetch_is_exclusive_per_entry() {
        let temp = TempDir::new().unwrap();
        let store = EntryStore::new(temp.path(), Duration::from_millis(200));

        let held = store.begin_fetch(URI).unwrap();
        let err = store.begin_fetch(URI).unwrap_err();
        assert!(matches!(err, DepotError::Busy { .. }));

        store.release(held);
        assert!(store.begin_fetch(URI).is_ok());
    }

    #[test]
    fn distinct_uris_do_not_contend() {
        let temp = TempDir::new().unwrap();
        let store = EntryStore::new(temp.path(), Duration::from_millis(200));

        let _a = store.begin_fetch(URI).unwrap();
        let b = store.begin_fetch("https://vendor.example/other.zip");
        assert!(b.is_ok());
    }

    #[test]
    fn release_removes_staging_debris() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let lease = store.begin_fetch(URI).unwrap();
        let staging = lease.staging_path();
        fs::write(&staging, b"partial").unwrap();

        store.release(lease);
        assert!(!staging.exists());
    }

    #[test]
    fn release_leaves_prior_entry_usable() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        stage_and_promote(&store, URI, b"good payload");

        let lease = store.begin_fetch(URI).unwrap();
        fs::write(lease.staging_path(), b"partial junk").unwrap();
        store.release(lease);

        let entry = store.lookup(URI).unwrap().unwrap();
        assert_eq!(fs::read(&entry.payload_path).unwrap(), b"good payload");
    }

    #[test]
    fn crash_debris_is_invisible_to_lookup() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        // Simulate a process killed mid-stream: staging exists, no sidecar.
        let lease = store.begin_fetch(URI).unwrap();
        fs::write(lease.staging_path(), b"half-written").unwrap();
        std::mem::forget(lease); // lock file stays, as after SIGKILL

        assert!(store.lookup(URI).unwrap().is_none());
    }

    #[test]
    fn truncated_payload_is_treated_as_absent() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let entry = stage_and_promote(&store, URI, b"full payload bytes");
        fs::write(&entry.payload_path, b"trunc").unwrap();

        assert!(store.lookup(URI).unwrap().is_none());
    }

    #[test]
    fn touch_refreshes_cached_at_and_merges_validator() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        stage_and_promote(&store, URI, b"agent bytes");
        let before = store.lookup(URI).unwrap().unwrap();

        let lease = store.begin_fetch(URI).unwrap();
        let touched = store
            .touch(
                &lease,
                Some(Validator {
                    etag: Some("\"v2\"".to_string()),
                    last_modified: None,
                }),
            )
            .unwrap()
            .unwrap();
        store.release(lease);

        assert!(touched.cached_at >= before.cached_at);
        assert_eq!(touched.validator.etag.as_deref(), Some("\"v2\""));
        assert_eq!(touched.sha256, before.sha256);
    }

    #[test]
    fn verify_detects_corruption() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let entry = stage_and_promote(&store, URI, b"agent bytes");
        assert!(store.verify(&entry).unwrap());

        // Same length, different bytes: size check passes, hash must not.
        fs::write(&entry.payload_path, b"tampered byt").unwrap();
        assert!(!store.verify(&entry).unwrap());
    }

    #[test]
    fn list_orders_newest_first() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        stage_and_promote(&store, "https://vendor.example/a.zip", b"aaa");
        std::thread::sleep(Duration::from_millis(10));
        stage_and_promote(&store, "https://vendor.example/b.zip", b"bbbb");

        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].uri, "https://vendor.example/b.zip");
    }

    #[test]
    fn clear_removes_everything() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        stage_and_promote(&store, "https://vendor.example/a.zip", b"aaa");
        stage_and_promote(&store, "https://vendor.example/b.zip", b"bbbb");

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn total_size_sums_payloads() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        stage_and_promote(&store, "https://vendor.example/a.zip", b"12345");
        stage_and_promote(&store, "https://vendor.example/b.zip", b"1234567890");

        assert_eq!(store.total_size().unwrap(), 15);
    }

    #[test]
    fn list_on_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = EntryStore::new(temp.path().join("never-created"), Duration::from_secs(1));

        assert!(store.list().unwrap().is_empty());
    }
}
