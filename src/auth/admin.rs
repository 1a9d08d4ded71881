//! Admin-only principal management.
//!
//! Deleting a principal that still owns hosts is refused: hosts are never reassigned or deleted
//! implicitly, since their records live on at the provider.
use crate::auth::{password, require_admin};
use crate::config::AdminBootstrap;
use crate::error::Error;
use crate::store::{DynStore, Principal, StoreError};

/// Create a non-admin principal named `name` with the given secret.
///
/// # Errors
///
/// Returns [`Error::AdminRequired`] unless `actor` is an administrator,
/// [`Error::PrincipalExists`] if the name is taken, and [`Error::Storage`] or
/// [`Error::Password`] if storing the principal fails.
pub async fn create_principal(
    store: &DynStore,
    actor: &Principal,
    name: &str,
    secret: &str,
) -> Result<(), Error> {
    require_admin(actor)?;
    let name = name.trim();
    if name.is_empty() || name.contains(':') {
        return Err(Error::InvalidPrincipalName(name.to_string()));
    }
    let secret = secret.to_string();
    let secret_hash = tokio::task::spawn_blocking(move || password::hash_secret(&secret))
        .await
        .map_err(|err| password::PasswordError::HashingFailed(err.to_string()))??;

    let mut tx = store.begin().await?;
    if tx.count_principals(name).await? != 0 {
        return Err(Error::PrincipalExists(name.to_string()));
    }
    tx.insert_principal(Principal {
        name: name.to_string(),
        secret_hash,
        admin: false,
    })
    .await
    .map_err(|err| match err {
        StoreError::DuplicatePrincipal(name) => Error::PrincipalExists(name),
        err => err.into(),
    })?;
    tx.commit().await?;
    tracing::info!("\"{}\" created principal \"{name}\"", actor.name);
    Ok(())
}

/// Delete the principal named `name`.
///
/// # Errors
///
/// Returns [`Error::AdminRequired`] unless `actor` is an administrator,
/// [`Error::PrincipalNotFound`] if there's no such principal, [`Error::PrincipalOwnsHosts`] if it
/// still owns hosts, and [`Error::Storage`] if the store fails.
pub async fn delete_principal(store: &DynStore, actor: &Principal, name: &str) -> Result<(), Error> {
    require_admin(actor)?;
    let mut tx = store.begin().await?;
    let hosts = tx.hosts_owned_by(name).await?.len();
    if hosts > 0 {
        return Err(Error::PrincipalOwnsHosts {
            name: name.to_string(),
            hosts,
        });
    }
    if !tx.delete_principal(name).await? {
        return Err(Error::PrincipalNotFound(name.to_string()));
    }
    tx.commit().await?;
    tracing::info!("\"{}\" deleted principal \"{name}\"", actor.name);
    Ok(())
}

/// Create the configured administrators that don't exist yet. Existing principals are left as
/// they are.
///
/// # Errors
///
/// Returns [`Error::Password`] if a configured hash isn't a PHC string and [`Error::Storage`] if
/// the store fails.
pub async fn bootstrap_admins(store: &DynStore, admins: &[AdminBootstrap]) -> Result<(), Error> {
    if admins.is_empty() {
        return Ok(());
    }
    let mut tx = store.begin().await?;
    let mut created = 0;
    for admin in admins {
        password::check_hash_format(&admin.secret_hash)?;
        if tx.count_principals(&admin.name).await? != 0 {
            continue;
        }
        tx.insert_principal(Principal {
            name: admin.name.clone(),
            secret_hash: admin.secret_hash.clone(),
            admin: true,
        })
        .await?;
        tracing::info!("created administrator \"{}\"", admin.name);
        created += 1;
    }
    if created > 0 {
        tx.commit().await?;
    }
    Ok(())
}
