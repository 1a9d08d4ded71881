//! Principals, credentials and the per-domain permission gate.
//!
//! A principal may use a domain if it already owns the domain, or if nobody owns it yet: using
//! an unowned domain claims it. Administrators may use any domain. Admin-only operations are
//! gated by [`require_admin`], never by [`can_use_host`].

use crate::challenge;
use crate::error::Error;
use crate::store::{DynStore, Principal};

pub mod admin;
pub mod password;

/// The permission decision over a snapshot of the domain's current owner.
#[must_use]
pub fn can_use_host(principal: &Principal, owner: Option<&str>) -> bool {
    principal.admin || owner.map_or(true, |owner| owner == principal.name)
}

/// # Errors
///
/// Returns [`Error::AdminRequired`] unless the principal is an administrator.
pub fn require_admin(principal: &Principal) -> Result<(), Error> {
    if principal.admin {
        Ok(())
    } else {
        Err(Error::AdminRequired(principal.name.clone()))
    }
}

/// Reads domain ownership from the store and applies [`can_use_host`]. Never writes.
#[derive(Clone)]
pub struct Gate {
    store: DynStore,
}

impl Gate {
    #[must_use]
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    /// Check that `principal` may use `domain`, returning the canonical name it is validated as
    /// (see [`challenge::validation_domain`]). Hosts are keyed by that name, so a wildcard and its
    /// base name always have the same owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDomain`] if `domain` isn't a valid name,
    /// [`Error::PermissionDenied`] if another principal owns it or it names a challenge record,
    /// and [`Error::Storage`] if the ownership lookup fails.
    pub async fn authorize(&self, principal: &Principal, domain: &str) -> Result<String, Error> {
        let canonical = challenge::validation_domain(domain)
            .map_err(|_| Error::InvalidDomain(domain.to_string()))?;
        if challenge::is_challenge_name(&canonical) {
            tracing::debug!("refused challenge name \"{canonical}\" for \"{}\"", principal.name);
            return Err(Error::PermissionDenied {
                principal: principal.name.clone(),
                domain: canonical,
            });
        }
        let host = self.store.host(&canonical).await?;
        let owner = host.as_ref().map(|host| host.owner.as_str());
        if !can_use_host(principal, owner) {
            tracing::debug!(
                "refused \"{}\" for \"{canonical}\", owned by \"{}\"",
                principal.name,
                owner.unwrap_or_default()
            );
            return Err(Error::PermissionDenied {
                principal: principal.name.clone(),
                domain: canonical,
            });
        }
        Ok(canonical)
    }

    /// Look up a principal by name and check its secret.
    ///
    /// Hash verification runs on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] for unknown names and wrong secrets.
    pub async fn authenticate(&self, name: &str, secret: &str) -> Result<Principal, Error> {
        let Some(principal) = self.store.principal(name).await? else {
            return Err(Error::Unauthenticated);
        };
        let secret = secret.to_string();
        let hash = principal.secret_hash.clone();
        let verified = tokio::task::spawn_blocking(move || password::verify_secret(&secret, &hash))
            .await
            .map_err(|_| Error::Unauthenticated)?;
        match verified {
            Ok(true) => Ok(principal),
            Ok(false) => Err(Error::Unauthenticated),
            Err(err) => {
                tracing::warn!("stored secret of \"{name}\" is unusable: {err}");
                Err(Error::Unauthenticated)
            }
        }
    }
}
