//! Durable storage of principals and host intents.
//!
//! The orchestrator treats a [`Transaction`] as its unit of work: changes become visible to other
//! readers only when [`Transaction::commit`] succeeds. A transaction dropped without committing
//! is discarded.
//!
//! One implementation is provided, [`memory::InMemoryStore`], which can optionally mirror every
//! commit to a JSON [state file][crate::state_file::StateFile].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;

pub mod memory;

#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryStore;

/// `DynStore` is a shareable, type-erased [`Store`].
#[allow(clippy::module_name_repetitions)]
pub type DynStore = Arc<dyn Store>;

/// Errors returned by [`Store`] and [`Transaction`] operations.
#[allow(clippy::module_name_repetitions)]
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Returned by [`Transaction::upsert_host`] when the domain is already owned by a different
    /// principal.
    #[error("host \"{domain}\" is owned by another principal")]
    HostOwned { domain: String },

    #[error("principal \"{0}\" already exists")]
    DuplicatePrincipal(String),

    #[error("failed to persist store state")]
    Persist(#[source] std::io::Error),
}

/// An identity allowed to call the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    /// Argon2 PHC string of the principal's secret.
    pub secret_hash: String,
    #[serde(default)]
    pub admin: bool,
}

/// The desired target records of a domain.
///
/// At most one of the address targets and the CNAME target is applied, see
/// [`crate::reconcile::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targets {
    pub a: Option<String>,
    pub aaaa: Option<String>,
    pub cname: Option<String>,
}

impl Targets {
    /// Build targets from request fields, where an empty string means absent.
    #[must_use]
    pub fn from_fields(a: &str, aaaa: &str, cname: &str) -> Self {
        let present = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        Self {
            a: present(a),
            aaaa: present(aaaa),
            cname: present(cname),
        }
    }

    /// Address targets take precedence: a CNAME is never kept alongside them.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.a.is_some() || self.aaaa.is_some() {
            self.cname = None;
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.a.is_none() && self.aaaa.is_none() && self.cname.is_none()
    }
}

/// Outcome of the last attempt to apply a host's targets to the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_attempt: Option<OffsetDateTime>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl SyncStatus {
    #[must_use]
    pub fn synced(at: OffsetDateTime) -> Self {
        Self {
            last_attempt: Some(at),
            last_error: None,
        }
    }

    #[must_use]
    pub fn failed(at: OffsetDateTime, error: impl ToString) -> Self {
        Self {
            last_attempt: Some(at),
            last_error: Some(error.to_string()),
        }
    }
}

/// A domain, its owner and its desired DNS targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Canonical FQDN, see [`crate::provider::canonical`].
    pub domain: String,
    pub owner: String,
    #[serde(default)]
    pub targets: Targets,
    #[serde(default)]
    pub sync: SyncStatus,
}

/// Everything a [`Store`] holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub principals: BTreeMap<String, Principal>,
    #[serde(default)]
    pub hosts: BTreeMap<String, Host>,
}

/// Snapshot reads and transaction scoping over the durable store.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Start a transaction. Transactions writing the same host are serialized through
    /// [`Transaction::lock_host`]; transactions touching different hosts run concurrently.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    async fn principal(&self, name: &str) -> Result<Option<Principal>, StoreError>;

    async fn host(&self, domain: &str) -> Result<Option<Host>, StoreError>;

    async fn hosts(&self) -> Result<Vec<Host>, StoreError>;
}

/// A unit of work over the store.
#[async_trait::async_trait]
pub trait Transaction: Send + Sync {
    /// Lock the host keyed by `domain` until this transaction ends, waiting for any other
    /// transaction holding it. Reads of the host after locking see its latest committed state.
    async fn lock_host(&mut self, domain: &str) -> Result<(), StoreError>;

    /// Like [`Transaction::lock_host`], but returns `false` instead of waiting when another
    /// transaction holds the host.
    async fn try_lock_host(&mut self, domain: &str) -> Result<bool, StoreError>;

    async fn host(&self, domain: &str) -> Result<Option<Host>, StoreError>;

    /// Insert or replace the host keyed by its domain, locking it first if needed.
    ///
    /// Fails with [`StoreError::HostOwned`] if the domain exists with a different owner.
    async fn upsert_host(&mut self, host: Host) -> Result<(), StoreError>;

    async fn hosts_owned_by(&self, owner: &str) -> Result<Vec<Host>, StoreError>;

    /// Principal operations are serialized across transactions.
    async fn count_principals(&mut self, name: &str) -> Result<usize, StoreError>;

    /// Fails with [`StoreError::DuplicatePrincipal`] if the name is taken.
    async fn insert_principal(&mut self, principal: Principal) -> Result<(), StoreError>;

    /// Returns whether a principal was deleted.
    async fn delete_principal(&mut self, name: &str) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
