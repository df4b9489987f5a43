//! Configuration loading and validation.
//!
//! All configuration is consumed from the environment (`DEPOT_*` variables),
//! matching the contract of the staging environments this cache serves. The
//! CLI binds the same variables through clap's `env` support, so flags and
//! environment resolve identically.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DepotError, Result};

/// Cache root directory. Defaults to the platform cache directory.
pub const ENV_CACHE_ROOT: &str = "DEPOT_CACHE_ROOT";
/// Pre-staged offline cache directory. Absence means online operation.
pub const ENV_OFFLINE_ROOT: &str = "DEPOT_OFFLINE_ROOT";
/// Host (or `*.suffix` pattern, or URL) exempt from certificate validation.
pub const ENV_INSECURE_HOST: &str = "DEPOT_INSECURE_HOST";
/// Freshness window during which a valid entry skips revalidation.
pub const ENV_FRESH_FOR: &str = "DEPOT_FRESH_FOR";
/// Bounded wait for the per-entry fetch lease.
pub const ENV_LOCK_WAIT: &str = "DEPOT_LOCK_WAIT";
/// TCP connect timeout for fetches.
pub const ENV_CONNECT_TIMEOUT: &str = "DEPOT_CONNECT_TIMEOUT";
/// Overall transfer timeout for fetches.
pub const ENV_TRANSFER_TIMEOUT: &str = "DEPOT_TRANSFER_TIMEOUT";

/// Resolved configuration for a cache client.
#[derive(Debug, Clone)]
pub struct DepotConfig {
    /// Root directory for the online entry store.
    pub cache_root: PathBuf,
    /// Pre-staged offline directory, if configured.
    pub offline_root: Option<PathBuf>,
    /// Host pattern exempt from certificate validation, if configured.
    pub insecure_host: Option<String>,
    /// Freshness window; zero revalidates on every request.
    pub fresh_for: Duration,
    /// Bounded wait for the per-entry fetch lease.
    pub lock_wait: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Overall transfer timeout.
    pub transfer_timeout: Duration,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            offline_root: None,
            insecure_host: None,
            fresh_for: Duration::ZERO,
            lock_wait: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            transfer_timeout: Duration::from_secs(300),
        }
    }
}

impl DepotConfig {
    /// Load configuration from `DEPOT_*` environment variables.
    ///
    /// Malformed values are fatal (`ConfigInvalid`); absent values fall back
    /// to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(root) = non_empty_var(ENV_CACHE_ROOT) {
            config.cache_root = PathBuf::from(root);
        }
        if let Some(root) = non_empty_var(ENV_OFFLINE_ROOT) {
            config.offline_root = Some(PathBuf::from(root));
        }
        if let Some(host) = non_empty_var(ENV_INSECURE_HOST) {
            config.insecure_host = Some(host);
        }
        if let Some(value) = non_empty_var(ENV_FRESH_FOR) {
            config.fresh_for = parse_duration_var(ENV_FRESH_FOR, &value)?;
        }
        if let Some(value) = non_empty_var(ENV_LOCK_WAIT) {
            config.lock_wait = parse_duration_var(ENV_LOCK_WAIT, &value)?;
        }
        if let Some(value) = non_empty_var(ENV_CONNECT_TIMEOUT) {
            config.connect_timeout = parse_duration_var(ENV_CONNECT_TIMEOUT, &value)?;
        }
        if let Some(value) = non_empty_var(ENV_TRANSFER_TIMEOUT) {
            config.transfer_timeout = parse_duration_var(ENV_TRANSFER_TIMEOUT, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(DepotError::ConfigInvalid {
                message: "connect timeout must be non-zero".to_string(),
            });
        }
        if self.transfer_timeout < self.connect_timeout {
            return Err(DepotError::ConfigInvalid {
                message: format!(
                    "transfer timeout ({}) is shorter than connect timeout ({})",
                    format_duration(self.transfer_timeout),
                    format_duration(self.connect_timeout)
                ),
            });
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_duration_var(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value).ok_or_else(|| DepotError::ConfigInvalid {
        message: format!("{} is not a duration: '{}'", name, value),
    })
}

/// Default cache root: the platform cache directory, falling back to the
/// system temporary-files area.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("depot")
        .join("artifacts")
}

/// Parse a duration string like "7d", "24h", "30m", "45s", or bare seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();

    let (number, multiplier) = if let Some(days) = value.strip_suffix('d') {
        (days, 86400)
    } else if let Some(hours) = value.strip_suffix('h') {
        (hours, 3600)
    } else if let Some(mins) = value.strip_suffix('m') {
        (mins, 60)
    } else if let Some(secs) = value.strip_suffix('s') {
        (secs, 1)
    } else {
        (value.as_str(), 1)
    };

    let n: u64 = number.trim().parse().ok()?;
    Some(Duration::from_secs(n * multiplier))
}

/// Format a duration for display.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs >= 86400 && secs % 86400 == 0 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
