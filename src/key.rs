//! Entry key derivation.
//!
//! Cache entries are keyed by a sha256 digest of the canonicalized source
//! URI, never by the raw URI (which may contain characters unsafe for path
//! segments). The online store and the offline cache share this derivation
//! so pre-staged artifacts resolve to the same keys.

use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::error::{DepotError, Result};

/// Canonicalize an artifact URI.
///
/// Parsing through `Url` normalizes scheme/host case, drops default ports,
/// and percent-encodes the path, so equivalent spellings of one URI map to
/// one cache entry. Only absolute http(s) URIs are accepted.
pub fn canonicalize(uri: &str) -> Result<Url> {
    let url = Url::parse(uri).map_err(|e| DepotError::UriInvalid {
        uri: uri.to_string(),
        message: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DepotError::UriInvalid {
                uri: uri.to_string(),
                message: format!("unsupported scheme '{}'", other),
            })
        }
    }

    if url.host_str().is_none() {
        return Err(DepotError::UriInvalid {
            uri: uri.to_string(),
            message: "missing host".to_string(),
        });
    }

    Ok(url)
}

/// Derive the cache entry key for an artifact URI.
pub fn entry_key(uri: &str) -> Result<String> {
    let url = canonicalize(uri)?;
    Ok(hex::encode(Sha256::digest(url.as_str().as_bytes())))
}
