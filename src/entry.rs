//! Cache entry and validator metadata types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Revalidation tokens returned by the origin on the last successful fetch.
///
/// Either field may be absent; an entry with no validator at all can only be
/// refreshed by a full re-transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// ETag header from the last response, if any.
    pub etag: Option<String>,
    /// Last-Modified header from the last response, if any.
    pub last_modified: Option<String>,
}

impl Validator {
    /// True if at least one token is present.
    pub fn is_usable(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// One cached artifact, as recorded in the on-disk metadata sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Canonicalized source URI (the entry's identity).
    pub uri: String,
    /// Path to the stored payload.
    pub payload_path: PathBuf,
    /// Revalidation tokens for conditional requests.
    pub validator: Validator,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// sha256 of the stored payload, hex-encoded.
    pub sha256: String,
    /// When the payload was last confirmed current.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(uri: impl Into<String>, payload_path: impl Into<PathBuf>) -> Self {
        Self {
            uri: uri.into(),
            payload_path: payload_path.into(),
            validator: Validator::default(),
            size_bytes: 0,
            sha256: String::new(),
            cached_at: Utc::now(),
        }
    }

    /// Set the validator tokens.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Set payload size in bytes.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size_bytes = size;
        self
    }

    /// Set the payload hash.
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = sha256.into();
        self
    }

    /// Age of this entry.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.cached_at)
    }

    /// Whether the entry is still inside the freshness window.
    ///
    /// A zero window means every request revalidates; expiry is advisory
    /// staleness and never evicts the payload.
    pub fn is_fresh(&self, window: Duration) -> bool {
        if window.is_zero() {
            return false;
        }
        match chrono::Duration::from_std(window) {
            Ok(w) => self.age() < w,
            Err(_) => true,
        }
    }
}
