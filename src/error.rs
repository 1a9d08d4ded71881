//! Error types.

use crate::auth::password::PasswordError;
use crate::challenge::ChallengeError;
use crate::provider::ProviderError;
use crate::store::StoreError;
use axum::extract::rejection::JsonRejection;
use serde::Serialize;
use std::time::Duration;
use trust_dns_server::proto::error::ProtoError;

/// The outcome code reported to callers of the challenge endpoints.
///
/// [`Error::outcome`] maps the errors of the challenge endpoints onto these codes, so callers can
/// tell a policy refusal from a retryable remote failure without parsing the human-readable
/// message.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    #[serde(rename = "success")]
    Success,
    PermissionDenied,
    StorageError,
    ProviderError,
    ChallengeError,
}

/// Error enumerates the possible acmehost error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a principal asks to present or clean up a challenge for a domain owned by
    /// another principal.
    #[error("principal \"{principal}\" is not permitted to use \"{domain}\"")]
    PermissionDenied { principal: String, domain: String },

    /// Returned when the requested domain is not a valid DNS name.
    #[error("invalid domain name \"{0}\"")]
    InvalidDomain(String),

    /// Returned when a request carries no credentials, or credentials that don't verify.
    #[error("authentication required")]
    Unauthenticated,

    /// Returned when a non-admin principal calls an admin-only operation.
    #[error("principal \"{0}\" is not an administrator")]
    AdminRequired(String),

    /// Returned when creating a principal with an empty name, or a name containing `:` which
    /// can't be used in HTTP Basic credentials.
    #[error("invalid principal name \"{0}\"")]
    InvalidPrincipalName(String),

    /// Returned when creating a principal whose name is already taken.
    #[error("principal \"{0}\" already exists")]
    PrincipalExists(String),

    /// Returned when deleting a principal that doesn't exist.
    #[error("principal \"{0}\" not found")]
    PrincipalNotFound(String),

    /// Returned when deleting a principal that still owns hosts. Hosts must be released first.
    #[error("principal \"{name}\" still owns {hosts} host(s)")]
    PrincipalOwnsHosts { name: String, hosts: usize },

    /// Returned when a whole present or clean-up call outlives the configured request deadline.
    /// The in-flight transaction is discarded.
    #[error("request deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Returned at startup when the configured provider name isn't registered.
    #[error("unrecognized DNS provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    /// Returned when clients `POST` invalid JSON.
    #[error(transparent)]
    JsonExtractorRejection(#[from] JsonRejection),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON from disk (e.g. the [`Config`][crate::config::Config]
    /// or a [state file][crate::state_file::StateFile]) fails due to invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when the embedded DNS server encounters a generic DNS protocol error.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),
}

impl Error {
    /// Map the error onto the outcome code surfaced to callers, if it has one.
    ///
    /// Deadline expiry counts as a provider failure: the remote calls are the only steps that
    /// block on the network, and the operation is safe to retry. Malformed requests, bad
    /// credentials and principal management errors carry no outcome code.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Error::Storage(_) | Error::Password(_) | Error::IO(_) | Error::InvalidJSON(_) => {
                Some(Outcome::StorageError)
            }
            Error::Provider(_)
            | Error::DeadlineExceeded(_)
            | Error::UnknownProvider(_)
            | Error::DNSError(_) => Some(Outcome::ProviderError),
            Error::Challenge(_) => Some(Outcome::ChallengeError),
            Error::PermissionDenied { .. } | Error::AdminRequired(_) => {
                Some(Outcome::PermissionDenied)
            }
            Error::InvalidDomain(_)
            | Error::Unauthenticated
            | Error::InvalidPrincipalName(_)
            | Error::PrincipalExists(_)
            | Error::PrincipalNotFound(_)
            | Error::PrincipalOwnsHosts { .. }
            | Error::JsonExtractorRejection(_) => None,
        }
    }
}
