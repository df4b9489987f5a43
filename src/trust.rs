//! TLS trust policy.
//!
//! A process-wide allow-list (of exactly one value, matching the
//! configuration surface) naming the host for which certificate-chain
//! validation is skipped. Intended only for staging environments serving
//! artifacts from a self-signed or internally-issued certificate. The
//! policy gates certificate validation and nothing else; payload integrity
//! is still enforced by content hashing after transfer.

use std::sync::RwLock;

use reqwest::Url;
use tracing::warn;

use crate::error::{DepotError, Result};
use crate::key::canonicalize;

/// Allow-list of hosts exempt from certificate validation.
///
/// Initialized to "validate everything"; updated (last-writer-wins) from
/// configuration before any fetch and injected into the download engine at
/// construction. Reads happen on every connection attempt.
#[derive(Debug, Default)]
pub struct TrustPolicy {
    allowed: RwLock<Option<String>>,
}

impl TrustPolicy {
    /// A policy that validates every certificate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a policy from the configured allow-list value, if any.
    pub fn from_config(value: Option<&str>) -> Result<Self> {
        let policy = Self::new();
        if let Some(value) = value {
            policy.allow(value)?;
        }
        Ok(policy)
    }

    /// Register a host for which certificate validation is skipped.
    ///
    /// Accepts an exact host (`repo.example.com`), a wildcard pattern
    /// (`*.example.com`), or a full URL whose host is extracted. Replaces
    /// any previously registered value.
    pub fn allow(&self, pattern: &str) -> Result<()> {
        let normalized = normalize_pattern(pattern)?;
        warn!(host = %normalized, "certificate validation disabled for host");
        *self.allowed.write().expect("trust policy lock poisoned") = Some(normalized);
        Ok(())
    }

    /// Whether the certificate chain for `uri` must be validated.
    ///
    /// Unparseable URIs validate; the download engine rejects them before a
    /// connection is attempted anyway.
    pub fn should_validate(&self, uri: &str) -> bool {
        let host = match canonicalize(uri) {
            Ok(url) => match url.host_str() {
                Some(host) => host.to_ascii_lowercase(),
                None => return true,
            },
            Err(_) => return true,
        };

        let allowed = self.allowed.read().expect("trust policy lock poisoned");
        match allowed.as_deref() {
            Some(pattern) => !host_matches(pattern, &host),
            None => true,
        }
    }
}

/// Reduce an allow-list value to a lowercase host pattern.
fn normalize_pattern(pattern: &str) -> Result<String> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(DepotError::ConfigInvalid {
            message: "insecure host pattern is empty".to_string(),
        });
    }

    // Full URLs are reduced to their host.
    if pattern.contains("://") {
        let url = Url::parse(pattern).map_err(|e| DepotError::ConfigInvalid {
            message: format!("insecure host pattern '{}' is not a URL: {}", pattern, e),
        })?;
        return url
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| DepotError::ConfigInvalid {
                message: format!("insecure host pattern '{}' has no host", pattern),
            });
    }

    let host = pattern.to_ascii_lowercase();
    if host.contains('/') || host.contains(' ') {
        return Err(DepotError::ConfigInvalid {
            message: format!("insecure host pattern '{}' is not a host", pattern),
        });
    }
    Ok(host)
}

/// Exact host match, or `*.suffix` wildcard covering subdomains.
fn host_matches(pattern: &str, host: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        host == suffix || host.ends_with(&format!(".{}", suffix))
    } else {
        host == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_validates_everything() {
        let policy = TrustPolicy::new();
        assert!(policy.should_validate("https://vendor.example/agent.zip"));
    }

    #[test]
    fn allowed_host_skips_validation() {
        let policy = TrustPolicy::new();
        policy.allow("vendor.example").unwrap();

        assert!(!policy.should_validate("https://vendor.example/agent.zip"));
    }

    #[test]
    fn allowance_is_scoped_to_the_named_host() {
        let policy = TrustPolicy::new();
        policy.allow("a.example.com").unwrap();

        assert!(!policy.should_validate("https://a.example.com/agent.zip"));
        assert!(policy.should_validate("https://b.example.com/agent.zip"));
    }

    #[test]
    fn wildcard_covers_subdomains_only() {
        let policy = TrustPolicy::new();
        policy.allow("*.internal.example.com").unwrap();

        assert!(!policy.should_validate("https://repo.internal.example.com/a.zip"));
        assert!(!policy.should_validate("https://internal.example.com/a.zip"));
        assert!(policy.should_validate("https://example.com/a.zip"));
        assert!(policy.should_validate("https://evil-internal.example.com.attacker.net/a.zip"));
    }

    #[test]
    fn url_pattern_is_reduced_to_its_host() {
        let policy = TrustPolicy::new();
        policy.allow("https://repo.example.com:8443/installers").unwrap();

        assert!(!policy.should_validate("https://repo.example.com/agent.zip"));
        assert!(policy.should_validate("https://other.example.com/agent.zip"));
    }

    #[test]
    fn host_matching_is_case_insensitive() {
        let policy = TrustPolicy::new();
        policy.allow("Vendor.Example").unwrap();

        assert!(!policy.should_validate("https://VENDOR.example/agent.zip"));
    }

    #[test]
    fn last_writer_wins() {
        let policy = TrustPolicy::new();
        policy.allow("first.example").unwrap();
        policy.allow("second.example").unwrap();

        assert!(policy.should_validate("https://first.example/a.zip"));
        assert!(!policy.should_validate("https://second.example/a.zip"));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let policy = TrustPolicy::new();
        let err = policy.allow("   ").unwrap_err();
        assert!(matches!(err, DepotError::ConfigInvalid { .. }));
    }

    #[test]
    fn path_like_pattern_is_rejected() {
        let policy = TrustPolicy::new();
        assert!(policy.allow("example.com/path").is_err());
    }

    #[test]
    fn from_config_with_none_validates_everything() {
        let policy = TrustPolicy::from_config(None).unwrap();
        assert!(policy.should_validate("https://vendor.example/agent.zip"));
    }

    #[test]
    fn from_config_with_value_applies_it() {
        let policy = TrustPolicy::from_config(Some("vendor.example")).unwrap();
        assert!(!policy.should_validate("https://vendor.example/agent.zip"));
    }

    #[test]
    fn unparseable_uri_validates() {
        let policy = TrustPolicy::new();
        policy.allow("vendor.example").unwrap();
        assert!(policy.should_validate("not a uri"));
    }
}
