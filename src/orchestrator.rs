//! Challenge present and clean-up.
//!
//! Presenting a challenge spans two failure domains: the store, which is transactional, and the
//! provider, which isn't. A present call runs:
//!
//! 1. authorize the principal for the domain,
//! 2. open a transaction, lock the host, re-check its owner and write the new targets into it,
//! 3. apply the targets at the provider while the transaction is still open,
//! 4. present the challenge,
//! 5. commit.
//!
//! Any failure discards the transaction, so the stored intent only changes when every step
//! succeeded. Provider changes can't be discarded the same way: when a later step fails, the
//! previously committed targets of the host are re-applied on a best-effort basis. Records the
//! committed targets don't overwrite are logged as drift; a failed restore is retried by the
//! [reconciliation job][crate::sync].
//!
//! The host lock is held until the transaction ends, so presents for the same host run one
//! after the other while presents for different hosts don't wait on each other.
//!
//! Clean-up only authorizes and cleans up the challenge; it never touches the store.
use crate::auth::{self, Gate};
use crate::challenge::DynChallenge;
use crate::error::Error;
use crate::provider::{DynProvider, ProviderError, RetryPolicy};
use crate::reconcile::{self, Mutation};
use crate::store::{DynStore, Host, Principal, StoreError, SyncStatus, Targets, Transaction};
use std::future::Future;
use std::time::Duration;
use time::OffsetDateTime;

/// A request to present the challenge for `domain`, after pointing it at `targets`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentRequest {
    pub domain: String,
    pub token: String,
    pub key_auth: String,
    pub targets: Targets,
}

/// A request to clean up the challenge for `domain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanUpRequest {
    pub domain: String,
    pub token: String,
    pub key_auth: String,
}

#[derive(Clone)]
pub struct Orchestrator {
    gate: Gate,
    store: DynStore,
    provider: DynProvider,
    challenge: DynChallenge,
    retry: RetryPolicy,
    deadline: Duration,
}

impl Orchestrator {
    #[must_use]
    pub fn new(store: DynStore, provider: DynProvider, challenge: DynChallenge) -> Self {
        Self {
            gate: Gate::new(store.clone()),
            store,
            provider,
            challenge,
            retry: RetryPolicy::default(),
            deadline: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Point the domain at the requested targets and present its challenge.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] or [`Error::InvalidDomain`] if the principal may not use the
    ///   domain. Nothing is written and the provider is not called.
    /// - [`Error::Storage`] if the store fails.
    /// - [`Error::Provider`] if applying the targets fails, and [`Error::DeadlineExceeded`] if the
    ///   whole call takes too long. Both are safe to retry.
    /// - [`Error::Challenge`] if presenting the challenge fails.
    pub async fn present(&self, principal: &Principal, req: &PresentRequest) -> Result<(), Error> {
        self.bounded(self.run_present(principal, req)).await
    }

    /// Clean up the domain's challenge. Host targets are left as they are.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] or [`Error::InvalidDomain`] if the principal may not use the
    ///   domain.
    /// - [`Error::Challenge`] if cleaning up fails.
    /// - [`Error::DeadlineExceeded`] if the call takes too long.
    pub async fn clean_up(&self, principal: &Principal, req: &CleanUpRequest) -> Result<(), Error> {
        self.bounded(async {
            let domain = self.gate.authorize(principal, &req.domain).await?;
            self.challenge
                .clean_up(req.domain.trim(), &req.token, &req.key_auth)
                .await?;
            tracing::info!("\"{}\" cleaned up challenge for {domain}", principal.name);
            Ok(())
        })
        .await
    }

    async fn bounded<F>(&self, op: F) -> Result<(), Error>
    where
        F: Future<Output = Result<(), Error>>,
    {
        tokio::time::timeout(self.deadline, op)
            .await
            .map_err(|_| Error::DeadlineExceeded(self.deadline))?
    }

    async fn run_present(&self, principal: &Principal, req: &PresentRequest) -> Result<(), Error> {
        let domain = self.gate.authorize(principal, &req.domain).await?;

        let mut tx = self.store.begin().await?;
        tx.lock_host(&domain).await?;
        let previous = tx.host(&domain).await?;
        // Another call may have claimed the host since it was authorized.
        if !auth::can_use_host(principal, previous.as_ref().map(|host| host.owner.as_str())) {
            discard(tx).await;
            return Err(Error::PermissionDenied {
                principal: principal.name.clone(),
                domain,
            });
        }
        let targets = req.targets.clone().normalized();
        let host = Host {
            domain: domain.clone(),
            owner: previous
                .as_ref()
                .map_or_else(|| principal.name.clone(), |host| host.owner.clone()),
            targets: targets.clone(),
            sync: previous
                .as_ref()
                .map(|host| host.sync.clone())
                .unwrap_or_default(),
        };
        if let Err(err) = tx.upsert_host(host.clone()).await {
            discard(tx).await;
            return Err(match err {
                StoreError::HostOwned { domain } => Error::PermissionDenied {
                    principal: principal.name.clone(),
                    domain,
                },
                err => err.into(),
            });
        }

        let mutations = reconcile::reconcile(&domain, &targets);
        if let Err((applied, err)) = self.provision(&domain, &mutations).await {
            tracing::warn!("provisioning {domain} failed: {err}");
            self.compensate(previous.as_ref(), &domain, &mutations[..applied])
                .await;
            discard(tx).await;
            return Err(err.into());
        }
        if !mutations.is_empty() {
            let synced = Host {
                sync: SyncStatus::synced(OffsetDateTime::now_utc()),
                ..host
            };
            if let Err(err) = tx.upsert_host(synced).await {
                self.compensate(previous.as_ref(), &domain, &mutations)
                    .await;
                discard(tx).await;
                return Err(err.into());
            }
        }

        if let Err(err) = self
            .challenge
            .present(req.domain.trim(), &req.token, &req.key_auth)
            .await
        {
            tracing::warn!("presenting challenge for {domain} failed: {err}");
            self.compensate(previous.as_ref(), &domain, &mutations)
                .await;
            discard(tx).await;
            return Err(err.into());
        }

        if let Err(err) = tx.commit().await {
            tracing::warn!("committing {domain} failed: {err}");
            self.compensate(previous.as_ref(), &domain, &mutations)
                .await;
            return Err(err.into());
        }
        tracing::info!(
            "\"{}\" presented challenge for {domain} with {} record update(s)",
            principal.name,
            mutations.len()
        );
        Ok(())
    }

    /// Apply `mutations` and refresh the owning zone. On failure, returns how many mutations were
    /// applied.
    async fn provision(
        &self,
        domain: &str,
        mutations: &[Mutation],
    ) -> Result<(), (usize, ProviderError)> {
        if mutations.is_empty() {
            return Ok(());
        }
        let zone = self
            .retry
            .run("extract auth zone", || self.provider.extract_auth_zone(domain))
            .await
            .map_err(|err| (0, err))?;
        reconcile::apply(self.provider.as_ref(), mutations, &self.retry).await?;
        self.retry
            .run(&format!("refresh {zone}"), || self.provider.refresh(domain))
            .await
            .map_err(|err| (mutations.len(), err))
    }

    /// Best-effort restore of the committed targets after the `applied` mutations for `domain`
    /// were made but the present call failed. Applied records the committed targets don't cover
    /// are left in place and reported as drift.
    async fn compensate(&self, previous: Option<&Host>, domain: &str, applied: &[Mutation]) {
        if applied.is_empty() {
            return;
        }
        let restore = previous
            .map(|host| reconcile::reconcile(domain, &host.targets))
            .unwrap_or_default();
        if !restore.is_empty() {
            if let Err((_, err)) = self.provision(domain, &restore).await {
                tracing::warn!("restoring committed records for {domain} failed: {err}");
                return;
            }
        }
        let leftovers = reconcile::leftovers(applied, &restore);
        if leftovers.is_empty() {
            tracing::info!("restored committed records for {domain}");
            return;
        }
        for leftover in &leftovers {
            tracing::warn!("drift: {leftover} has no committed counterpart, left in place");
        }
    }
}

async fn discard(tx: Box<dyn Transaction>) {
    if let Err(err) = tx.rollback().await {
        tracing::warn!("rollback failed: {err}");
    }
}
