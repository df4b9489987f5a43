//! Cache client facade and backend selection.
//!
//! [`CacheClient::create`] decides once, at construction, whether requests
//! are served from a pre-staged offline directory or from the online entry
//! store + download engine pairing, and the choice never changes afterwards.
//! Framework components only ever see `get(uri) -> local path`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::DepotConfig;
use crate::download::{DownloadEngine, FetchOutcome};
use crate::error::{DepotError, Result};
use crate::offline::OfflineCache;
use crate::store::EntryStore;
use crate::trust::TrustPolicy;

enum Backend {
    Offline(OfflineCache),
    Online {
        store: EntryStore,
        engine: DownloadEngine,
    },
}

/// The single interface callers use to resolve artifact URIs to local paths.
pub struct CacheClient {
    backend: Backend,
    fresh_for: Duration,
}

impl CacheClient {
    /// Select a backend and build the client.
    ///
    /// The offline backend wins when a usable pre-staged directory is
    /// configured; otherwise the online pairing is constructed with the
    /// trust policy injected into the engine.
    pub fn create(config: &DepotConfig) -> Result<Self> {
        config.validate()?;

        if let Some(offline_root) = &config.offline_root {
            if OfflineCache::available(offline_root) {
                info!(root = %offline_root.display(), "using pre-staged offline cache");
                return Ok(Self {
                    backend: Backend::Offline(OfflineCache::new(offline_root)),
                    fresh_for: config.fresh_for,
                });
            }
            debug!(
                root = %offline_root.display(),
                "offline root configured but not usable, falling back to downloads"
            );
        }

        let trust = Arc::new(TrustPolicy::from_config(config.insecure_host.as_deref())?);
        let store = EntryStore::new(&config.cache_root, config.lock_wait);
        let engine = DownloadEngine::new(trust, config.connect_timeout, config.transfer_timeout)?;

        Ok(Self {
            backend: Backend::Online { store, engine },
            fresh_for: config.fresh_for,
        })
    }

    /// Resolve an artifact URI to a local payload path.
    pub fn get(&self, uri: &str) -> Result<PathBuf> {
        self.resolve(uri, false)
    }

    /// Resolve an artifact URI, forcing revalidation of any cached entry.
    ///
    /// The request is still conditional when a validator exists, so an
    /// unchanged artifact costs a 304 rather than a re-transfer.
    pub fn refresh(&self, uri: &str) -> Result<PathBuf> {
        self.resolve(uri, true)
    }

    /// Whether this client serves from the offline backend.
    pub fn is_offline(&self) -> bool {
        matches!(self.backend, Backend::Offline(_))
    }

    fn resolve(&self, uri: &str, force_revalidate: bool) -> Result<PathBuf> {
        match &self.backend {
            Backend::Offline(offline) => {
                offline
                    .lookup(uri)?
                    .ok_or_else(|| DepotError::OfflineMiss {
                        uri: uri.to_string(),
                    })
            }
            Backend::Online { store, engine } => {
                self.resolve_online(store, engine, uri, force_revalidate)
            }
        }
    }

    fn resolve_online(
        &self,
        store: &EntryStore,
        engine: &DownloadEngine,
        uri: &str,
        force_revalidate: bool,
    ) -> Result<PathBuf> {
        if !force_revalidate {
            if let Some(entry) = store.lookup(uri)? {
                if entry.is_fresh(self.fresh_for) {
                    debug!(uri, "serving fresh cache entry");
                    return Ok(entry.payload_path);
                }
            }
        }

        let lease = match store.begin_fetch(uri) {
            Ok(lease) => lease,
            Err(DepotError::Busy { .. }) => {
                // The holder we waited on may have finished the fetch; its
                // result is authoritative.
                if let Some(entry) = store.lookup(uri)? {
                    debug!(uri, "entry completed by concurrent fetch");
                    return Ok(entry.payload_path);
                }
                return Err(DepotError::Busy {
                    uri: uri.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        // Re-check under the lease: the previous holder may have promoted
        // while we waited for it.
        let prior = store.lookup(uri)?;
        if !force_revalidate {
            if let Some(entry) = &prior {
                if entry.is_fresh(self.fresh_for) {
                    let path = entry.payload_path.clone();
                    store.release(lease);
                    return Ok(path);
                }
            }
        }

        let validator = prior
            .as_ref()
            .map(|e| &e.validator)
            .filter(|v| v.is_usable());

        let outcome = engine.fetch(uri, validator, &lease.staging_path());

        match outcome {
            Ok(FetchOutcome::Downloaded {
                validator,
                sha256,
                size_bytes,
            }) => {
                debug!(uri, size_bytes, "downloaded new payload");
                match store.promote(lease, validator, &sha256) {
                    Ok(entry) => Ok(entry.payload_path),
                    Err(err) => self.fail_soft(uri, prior, err),
                }
            }
            Ok(FetchOutcome::NotModified { validator }) => {
                let touched = store.touch(&lease, validator)?;
                store.release(lease);
                match touched {
                    Some(entry) => Ok(entry.payload_path),
                    None => Err(DepotError::Network {
                        uri: uri.to_string(),
                        message: "origin answered 304 but no payload is cached".to_string(),
                    }),
                }
            }
            Err(err) => {
                store.release(lease);
                self.fail_soft(uri, prior, err)
            }
        }
    }

    /// Fail soft on revalidation, fail hard on first fetch: a failed refresh
    /// never invalidates previously cached good data.
    fn fail_soft(
        &self,
        uri: &str,
        prior: Option<crate::entry::CacheEntry>,
        err: DepotError,
    ) -> Result<PathBuf> {
        match prior {
            Some(entry) => {
                warn!(uri, error = %err, "fetch failed, serving previously cached payload");
                Ok(entry.payload_path)
            }
            None => Err(err),
        }
    }
}
