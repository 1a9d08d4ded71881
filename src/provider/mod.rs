//! DNS provider abstraction.
//!
//! A [`DnsProvider`] mutates records held by some DNS hosting service. The orchestrator only ever
//! talks to a provider through this trait; concrete providers are selected by name at startup
//! through the [`registry::ProviderRegistry`].
//!
//! One provider ships with acmehost: [`local::LocalProvider`], registered as `"local"`, which
//! keeps its zones in-process and serves them through the [embedded DNS server][crate::dns].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_client::rr::Name;

pub mod local;
pub mod registry;
pub mod retry;

pub use local::{LocalProvider, SharedRecordTable};
pub use registry::ProviderRegistry;
pub use retry::RetryPolicy;

/// `DynProvider` is a shareable, type-erased [`DnsProvider`].
pub type DynProvider = Arc<dyn DnsProvider>;

/// The record types a provider can be asked to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::TXT => "TXT",
        })
    }
}

/// Errors returned by [`DnsProvider`] operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No zone served by the provider contains the name.
    #[error("no zone delegated to this provider contains \"{0}\"")]
    ZoneNotFound(String),

    #[error("invalid name \"{0}\"")]
    InvalidName(String),

    #[error("invalid {record_type} target \"{target}\"")]
    InvalidTarget {
        record_type: RecordType,
        target: String,
    },

    #[error("provider rejected credentials: {0}")]
    Authentication(String),

    #[error("provider rate limit reached")]
    RateLimited,

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider communication failed: {0}")]
    Communication(String),

    /// The provider applied the change but failed to make it durable.
    #[error("provider failed to persist records: {0}")]
    Persist(String),
}

impl ProviderError {
    /// Whether retrying the same call with the same arguments may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited
                | ProviderError::Timeout(_)
                | ProviderError::Communication(_)
                | ProviderError::Persist(_)
        )
    }
}

/// The capability interface every DNS provider implements.
///
/// All mutating operations are idempotent: repeating a call with the same arguments leaves the
/// provider in the same state and succeeds.
#[async_trait::async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create or replace the `record_type` record at `fqdn` with `target`. Succeeds without change
    /// if the record already holds that value.
    async fn set_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        target: &str,
    ) -> Result<(), ProviderError>;

    /// Remove every challenge (TXT) record at `fqdn`. Succeeds if there are none.
    async fn remove_records(&self, fqdn: &str) -> Result<(), ProviderError>;

    /// Map `fqdn` to the record label relative to its base `domain`.
    fn extract_record_name(&self, fqdn: &str, domain: &str) -> String {
        extract_record_name(fqdn, domain)
    }

    /// Find the zone owning `fqdn`.
    async fn extract_auth_zone(&self, fqdn: &str) -> Result<String, ProviderError>;

    /// Make the provider propagate its records for the zone owning `fqdn`.
    async fn refresh(&self, fqdn: &str) -> Result<(), ProviderError>;

    /// Providers keeping their records in-process expose them here so the
    /// [embedded DNS server][crate::dns] can answer for them.
    fn record_table(&self) -> Option<SharedRecordTable> {
        None
    }
}

/// Parse `name` as a lower-cased, fully qualified DNS name.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidName`] for names that aren't valid DNS names.
pub fn fqdn(name: &str) -> Result<Name, ProviderError> {
    let invalid = || ProviderError::InvalidName(name.to_string());
    if name.trim().is_empty() {
        return Err(invalid());
    }
    let mut parsed = Name::from_str(name).map_err(|_| invalid())?.to_lowercase();
    if parsed.is_root() {
        return Err(invalid());
    }
    parsed.set_fqdn(true);
    Ok(parsed)
}

/// The canonical string form of a domain: lower-cased, fully qualified, with the trailing dot.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidName`] for names that aren't valid DNS names.
pub fn canonical(name: &str) -> Result<String, ProviderError> {
    Ok(fqdn(name)?.to_ascii())
}

/// Strip the base `domain` from `fqdn`, leaving the provider-relative label. The zone apex maps
/// to the empty label. Names outside `domain` come back unchanged, without the trailing dot.
#[must_use]
pub fn extract_record_name(fqdn: &str, domain: &str) -> String {
    let fqdn = fqdn.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if fqdn == domain {
        return String::new();
    }
    match fqdn.strip_suffix(&format!(".{domain}")) {
        Some(label) => label.to_string(),
        None => fqdn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_name_strips_base_domain() {
        assert_eq!(
            extract_record_name("_acme-challenge.a.example.com.", "example.com"),
            "_acme-challenge.a"
        );
        assert_eq!(extract_record_name("a.Example.com", "example.com."), "a");
    }

    #[test]
    fn record_name_of_apex_is_empty() {
        assert_eq!(extract_record_name("example.com.", "example.com"), "");
    }

    #[test]
    fn record_name_outside_domain_is_unchanged() {
        assert_eq!(extract_record_name("a.example.org.", "example.com"), "a.example.org");
        assert_eq!(extract_record_name("badexample.com", "example.com"), "badexample.com");
    }

    #[test]
    fn canonical_names_are_lowercase_fqdns() {
        assert_eq!(canonical("A.Example.COM").unwrap(), "a.example.com.");
        assert_eq!(canonical("a.example.com.").unwrap(), "a.example.com.");
    }

    #[test]
    fn empty_and_root_names_are_invalid() {
        assert!(matches!(canonical(""), Err(ProviderError::InvalidName(_))));
        assert!(matches!(canonical("."), Err(ProviderError::InvalidName(_))));
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::Communication("reset".into()).is_retryable());
        assert!(!ProviderError::ZoneNotFound("a.example.org.".into()).is_retryable());
        assert!(!ProviderError::Authentication("bad key".into()).is_retryable());
    }
}
