//! Download engine.
//!
//! Performs conditional HTTP(S) fetches and streams payloads into the entry
//! store's staging path, hashing in flight. Transport-level failures are
//! retried a bounded number of times with backoff; origin error statuses are
//! not. Certificate validation is consulted per request through the injected
//! [`TrustPolicy`].

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::entry::Validator;
use crate::error::{DepotError, Result};
use crate::key::canonicalize;
use crate::trust::TrustPolicy;

/// Total attempts per fetch, including the first.
const MAX_ATTEMPTS: u32 = 3;
/// Base backoff between attempts; scaled by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Outcome of one engine fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Origin confirmed the cached payload is current; nothing transferred.
    NotModified {
        /// Validator tokens sent alongside the 304, if any.
        validator: Option<Validator>,
    },
    /// A full payload was streamed to the staging path.
    Downloaded {
        /// Validator tokens for future conditional requests.
        validator: Validator,
        /// Hash computed from the transferred bytes.
        sha256: String,
        /// Transferred byte count.
        size_bytes: u64,
    },
}

/// Conditional HTTP(S) fetcher with selective certificate validation.
pub struct DownloadEngine {
    validating: Client,
    insecure: Client,
    trust: Arc<TrustPolicy>,
}

impl DownloadEngine {
    /// Build an engine with the given trust policy and timeouts.
    pub fn new(
        trust: Arc<TrustPolicy>,
        connect_timeout: Duration,
        transfer_timeout: Duration,
    ) -> Result<Self> {
        let validating = client_builder(connect_timeout, transfer_timeout)
            .build()
            .context("building HTTP client")?;
        let insecure = client_builder(connect_timeout, transfer_timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .context("building certificate-exempt HTTP client")?;

        Ok(Self {
            validating,
            insecure,
            trust,
        })
    }

    /// Fetch `uri`, conditionally when a prior validator exists, streaming
    /// any payload into `staging`.
    ///
    /// The staging path is owned by the entry store; the engine never writes
    /// a final payload path.
    pub fn fetch(
        &self,
        uri: &str,
        prior: Option<&Validator>,
        staging: &Path,
    ) -> Result<FetchOutcome> {
        let url = canonicalize(uri)?;

        let client = if self.trust.should_validate(uri) {
            &self.validating
        } else {
            warn!(uri, "fetching without certificate validation");
            &self.insecure
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.attempt(client, url.as_str(), prior, staging) {
                Ok(outcome) => return Ok(outcome),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Transient(message)) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(DepotError::Network {
                            uri: uri.to_string(),
                            message,
                        });
                    }
                    let backoff = RETRY_BACKOFF * attempt;
                    warn!(uri, attempt, error = %message, "fetch failed, retrying");
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    fn attempt(
        &self,
        client: &Client,
        url: &str,
        prior: Option<&Validator>,
        staging: &Path,
    ) -> std::result::Result<FetchOutcome, Attempt> {
        let mut request = client.get(url);

        if let Some(validator) = prior {
            if let Some(etag) = &validator.etag {
                request = request.header("If-None-Match", etag);
            }
            if let Some(last_modified) = &validator.last_modified {
                request = request.header("If-Modified-Since", last_modified);
            }
        }

        let mut response = request.send().map_err(|e| Attempt::Transient(e.to_string()))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(url, "origin confirmed entry is current");
            let validator = validator_from(response.headers());
            return Ok(FetchOutcome::NotModified {
                validator: if validator.is_usable() {
                    Some(validator)
                } else {
                    None
                },
            });
        }

        if !response.status().is_success() {
            return Err(Attempt::Fatal(DepotError::HttpStatus {
                uri: url.to_string(),
                status: response.status().as_u16(),
            }));
        }

        let validator = validator_from(response.headers());

        let file = File::create(staging).map_err(|e| {
            Attempt::Fatal(DepotError::Other(anyhow::Error::new(e).context(format!(
                "creating staging file {}",
                staging.display()
            ))))
        })?;
        let mut writer = HashingWriter::new(file);

        // A transport error mid-stream leaves only staging debris, which the
        // store discards; the attempt is retriable.
        if let Err(e) = response.copy_to(&mut writer) {
            let _ = std::fs::remove_file(staging);
            return Err(Attempt::Transient(e.to_string()));
        }

        let (sha256, size_bytes) = writer.finish().map_err(|e| {
            let _ = std::fs::remove_file(staging);
            Attempt::Transient(e.to_string())
        })?;

        debug!(url, size_bytes, "payload streamed to staging");
        Ok(FetchOutcome::Downloaded {
            validator,
            sha256,
            size_bytes,
        })
    }
}

enum Attempt {
    /// Worth retrying: connect failures, timeouts, interrupted transfers.
    Transient(String),
    /// Not retried: origin error statuses, local IO setup failures.
    Fatal(DepotError),
}

fn client_builder(
    connect_timeout: Duration,
    transfer_timeout: Duration,
) -> reqwest::blocking::ClientBuilder {
    Client::builder()
        .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(connect_timeout)
        .timeout(transfer_timeout)
}

fn validator_from(headers: &HeaderMap) -> Validator {
    Validator {
        etag: headers
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        last_modified: headers
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    }
}

/// Writer that hashes and counts everything passing through it.
struct HashingWriter {
    file: File,
    hasher: Sha256,
    bytes: u64,
}

impl HashingWriter {
    fn new(file: File) -> Self {
        Self {
            file,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    fn finish(mut self) -> io::Result<(String, u64)> {
        self.file.flush()?;
        Ok((hex::encode(self.hasher.finalize()), self.bytes))
    }
}

impl Write for HashingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
