//! Depot - Shared artifact download cache for staging pipelines.
//!
//! Depot resolves artifact URIs to local filesystem paths. Behind the single
//! [`CacheClient`] facade it keeps a host-shared on-disk cache with
//! conditional HTTP revalidation, cross-process fetch leases, atomic
//! promotion, payload integrity hashing, selective certificate-validation
//! relaxation, and a read-only offline mode for pre-staged environments.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`client`] - Backend selection and the `get`/`refresh` facade
//! - [`config`] - Environment-driven configuration (`DEPOT_*`)
//! - [`download`] - Conditional HTTP(S) fetching with retries
//! - [`entry`] - Cache entry and validator metadata types
//! - [`error`] - Error types and result aliases
//! - [`key`] - Canonicalized-URI entry key derivation
//! - [`lease`] - Cross-process exclusive entry leases
//! - [`offline`] - Read-only pre-staged artifact lookup
//! - [`store`] - On-disk entry store with atomic promotion
//! - [`trust`] - TLS certificate-validation allow-list
//!
//! # Example
//!
//! ```no_run
//! use depot::client::CacheClient;
//! use depot::config::DepotConfig;
//!
//! let config = DepotConfig::from_env().unwrap();
//! let client = CacheClient::create(&config).unwrap();
//!
//! // Returns a local path, downloading at most once per artifact.
//! let path = client.get("https://vendor.example/agent.zip").unwrap();
//! println!("agent staged at {}", path.display());
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod download;
pub mod entry;
pub mod error;
pub mod key;
pub mod lease;
pub mod offline;
pub mod store;
pub mod trust;

pub use client::CacheClient;
pub use error::{DepotError, Result};
