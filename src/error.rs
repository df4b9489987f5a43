//! Error types for depot operations.
//!
//! This module defines [`DepotError`], the primary error type used throughout
//! the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Use `DepotError` for domain-specific errors that need distinct handling
//! - Use `anyhow::Error` (via `DepotError::Other`) for unexpected errors
//! - Transient network failures are retried inside the download engine and
//!   only surface as `Network` once the attempts are exhausted

use thiserror::Error;

/// Core error type for depot operations.
#[derive(Debug, Error)]
pub enum DepotError {
    /// Missing or malformed configuration. Fatal at startup.
    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    /// The artifact URI could not be parsed or is not http(s).
    #[error("Invalid artifact URI '{uri}': {message}")]
    UriInvalid { uri: String, message: String },

    /// Another fetch holds the entry lease and did not finish in time.
    #[error("Cache entry for {uri} is busy (another fetch in progress)")]
    Busy { uri: String },

    /// Network failure after all retry attempts were exhausted.
    #[error("Download of {uri} failed: {message}")]
    Network { uri: String, message: String },

    /// The origin answered with a non-success, non-304 status.
    #[error("HTTP {status} fetching {uri}")]
    HttpStatus { uri: String, status: u16 },

    /// The stored payload does not match the hash computed from the
    /// transferred bytes.
    #[error("Integrity mismatch for {uri}: expected sha256 {expected}, found {actual}")]
    IntegrityMismatch {
        uri: String,
        expected: String,
        actual: String,
    },

    /// No pre-staged artifact exists and no network backend is configured.
    #[error("No offline artifact staged for {uri}")]
    OfflineMiss { uri: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for depot operations.
pub type Result<T> = std::result::Result<T, DepotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_displays_message() {
        let err = DepotError::ConfigInvalid {
            message: "DEPOT_FRESH_FOR is not a duration".into(),
        };
        assert!(err.to_string().contains("DEPOT_FRESH_FOR"));
    }

    #[test]
    fn uri_invalid_displays_uri_and_message() {
        let err = DepotError::UriInvalid {
            uri: "ftp://host/a.zip".into(),
            message: "unsupported scheme".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ftp://host/a.zip"));
        assert!(msg.contains("unsupported scheme"));
    }

    #[test]
    fn busy_displays_uri() {
        let err = DepotError::Busy {
            uri: "https://vendor.example/agent.zip".into(),
        };
        assert!(err.to_string().contains("agent.zip"));
    }

    #[test]
    fn network_displays_uri_and_message() {
        let err = DepotError::Network {
            uri: "https://vendor.example/agent.zip".into(),
            message: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("agent.zip"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn http_status_displays_code() {
        let err = DepotError::HttpStatus {
            uri: "https://vendor.example/agent.zip".into(),
            status: 503,
        };
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn integrity_mismatch_displays_hashes() {
        let err = DepotError::IntegrityMismatch {
            uri: "https://vendor.example/agent.zip".into(),
            expected: "aaaa".into(),
            actual: "bbbb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aaaa"));
        assert!(msg.contains("bbbb"));
    }

    #[test]
    fn offline_miss_displays_uri() {
        let err = DepotError::OfflineMiss {
            uri: "https://vendor.example/agent.zip".into(),
        };
        assert!(err.to_string().contains("agent.zip"));
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: DepotError = io_err.into();
        assert!(matches!(err, DepotError::Io(_)));
    }

    #[test]
    fn result_type_alias_works() {
        fn returns_error() -> Result<()> {
            Err(DepotError::ConfigInvalid {
                message: "test".into(),
            })
        }
        assert!(returns_error().is_err());
    }
}
