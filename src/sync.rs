//! Background reconciliation of committed host targets.
//!
//! Provider changes made by a failed present call may outlive its discarded transaction, and
//! provider state can drift for reasons outside acmehost entirely. [`reconcile_all`] re-applies
//! every committed host's targets and records the outcome in the host's
//! [`SyncStatus`][crate::store::SyncStatus]; [`run`] does so periodically.
//!
//! Each host is reconciled in its own transaction holding the host's lock, so the targets applied
//! are always the latest committed ones. Hosts locked by an in-flight present are skipped until
//! the next pass: that present applies the targets itself.
use crate::error::Error;
use crate::provider::{DynProvider, RetryPolicy};
use crate::reconcile;
use crate::store::{DynStore, Host, SyncStatus};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;

/// Counts of hosts handled by one [`reconcile_all`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub synced: usize,
    pub failed: usize,
    /// Hosts without targets.
    pub skipped: usize,
    /// Hosts locked by another transaction.
    pub busy: usize,
}

/// Re-apply the targets of every committed host.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the store can't be read or a status can't be recorded.
/// Provider failures are recorded per host and don't fail the pass.
pub async fn reconcile_all(
    store: &DynStore,
    provider: &DynProvider,
    retry: &RetryPolicy,
) -> Result<Report, Error> {
    let mut report = Report::default();
    for listed in store.hosts().await? {
        let mut tx = store.begin().await?;
        if !tx.try_lock_host(&listed.domain).await? {
            tracing::debug!("{} is being updated, skipping", listed.domain);
            report.busy += 1;
            continue;
        }
        let host = match tx.host(&listed.domain).await? {
            Some(host) => host,
            None => continue,
        };
        let mutations = reconcile::reconcile(&host.domain, &host.targets);
        if mutations.is_empty() {
            report.skipped += 1;
            continue;
        }

        let applied = match reconcile::apply(provider.as_ref(), &mutations, retry).await {
            Ok(()) => retry
                .run("refresh", || provider.refresh(&host.domain))
                .await,
            Err((_, err)) => Err(err),
        };
        let now = OffsetDateTime::now_utc();
        let status = match applied {
            Ok(()) => {
                report.synced += 1;
                SyncStatus::synced(now)
            }
            Err(err) => {
                tracing::warn!("reconciling {} failed: {err}", host.domain);
                report.failed += 1;
                SyncStatus::failed(now, err)
            }
        };
        tx.upsert_host(Host {
            sync: status,
            ..host
        })
        .await?;
        tx.commit().await?;
    }
    Ok(report)
}

/// Run [`reconcile_all`] every `interval`, forever.
pub async fn run(store: DynStore, provider: DynProvider, retry: RetryPolicy, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match reconcile_all(&store, &provider, &retry).await {
            Ok(report) if report.failed > 0 => {
                tracing::warn!(
                    "reconciled {} host(s), {} failed",
                    report.synced,
                    report.failed
                );
            }
            Ok(report) => tracing::debug!(
                "reconciled {} host(s), {} busy",
                report.synced,
                report.busy
            ),
            Err(err) => tracing::error!("reconciliation pass failed: {err}"),
        }
    }
}
