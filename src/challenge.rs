//! Domain validation challenges.
//!
//! The orchestrator only needs to know whether presenting or cleaning up a challenge worked; how
//! the proof is published is up to the [`Challenge`] implementation. [`Dns01Solver`] publishes
//! [RFC-8555][RFC-8555] [DNS-01] responses as TXT records through a
//! [`DnsProvider`][crate::provider::DnsProvider].
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
use crate::provider::{self, DynProvider, ProviderError, RecordType};
use base64::engine::general_purpose;
use base64::{alphabet, engine, Engine};
use lazy_static::lazy_static;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// `DynChallenge` is a shareable, type-erased [`Challenge`].
pub type DynChallenge = Arc<dyn Challenge>;

const CHALLENGE_LABEL: &str = "_acme-challenge";

lazy_static! {
    static ref BASE64_ENGINE: engine::GeneralPurpose =
        engine::GeneralPurpose::new(&alphabet::URL_SAFE, general_purpose::NO_PAD);
}

#[derive(thiserror::Error, Debug)]
pub enum ChallengeError {
    #[error("challenge key authorization is empty")]
    EmptyKeyAuthorization,

    #[error("challenge record update failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("challenge call timed out after {0:?}")]
    Timeout(Duration),
}

/// Presents and cleans up the validation challenge of a domain.
///
/// Calls are not assumed to be idempotent and are never retried automatically.
#[async_trait::async_trait]
pub trait Challenge: Send + Sync {
    async fn present(&self, domain: &str, token: &str, key_auth: &str)
        -> Result<(), ChallengeError>;

    async fn clean_up(&self, domain: &str, token: &str, key_auth: &str)
        -> Result<(), ChallengeError>;
}

/// The canonical name `domain` is validated as. A wildcard is validated through its base name,
/// so `*.a.example.com` and `a.example.com` share one challenge record.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidName`] if `domain` isn't a valid name.
pub fn validation_domain(domain: &str) -> Result<String, ProviderError> {
    provider::canonical(domain.trim().trim_start_matches("*."))
}

/// Whether a canonical name is itself a challenge record name.
#[must_use]
pub fn is_challenge_name(canonical: &str) -> bool {
    canonical
        .split('.')
        .next()
        .map_or(false, |label| label.eq_ignore_ascii_case(CHALLENGE_LABEL))
}

/// The name the DNS-01 response for `domain` is published at.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidName`] if `domain` isn't a valid name.
pub fn challenge_fqdn(domain: &str) -> Result<String, ProviderError> {
    let domain = validation_domain(domain)?;
    Ok(format!("{CHALLENGE_LABEL}.{domain}"))
}

/// The DNS-01 TXT value for a key authorization: its SHA-256 digest, base64url encoded.
#[must_use]
pub fn challenge_value(key_auth: &str) -> String {
    BASE64_ENGINE.encode(Sha256::digest(key_auth.as_bytes()))
}

/// Publishes DNS-01 responses through a provider.
pub struct Dns01Solver {
    provider: DynProvider,
    timeout: Duration,
}

impl Dns01Solver {
    #[must_use]
    pub fn new(provider: DynProvider, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    async fn bounded<F>(&self, call: F) -> Result<(), ChallengeError>
    where
        F: std::future::Future<Output = Result<(), ProviderError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ChallengeError::Timeout(self.timeout))?
            .map_err(ChallengeError::from)
    }
}

#[async_trait::async_trait]
impl Challenge for Dns01Solver {
    async fn present(
        &self,
        domain: &str,
        _token: &str,
        key_auth: &str,
    ) -> Result<(), ChallengeError> {
        if key_auth.is_empty() {
            return Err(ChallengeError::EmptyKeyAuthorization);
        }
        let fqdn = challenge_fqdn(domain)?;
        let value = challenge_value(key_auth);
        self.bounded(self.provider.set_record(&fqdn, RecordType::TXT, &value))
            .await?;
        self.bounded(self.provider.refresh(&fqdn)).await?;
        tracing::info!("presented DNS-01 challenge at {fqdn}");
        Ok(())
    }

    async fn clean_up(
        &self,
        domain: &str,
        _token: &str,
        _key_auth: &str,
    ) -> Result<(), ChallengeError> {
        let fqdn = challenge_fqdn(domain)?;
        self.bounded(self.provider.remove_records(&fqdn)).await?;
        self.bounded(self.provider.refresh(&fqdn)).await?;
        tracing::info!("cleaned up DNS-01 challenge at {fqdn}");
        Ok(())
    }
}
