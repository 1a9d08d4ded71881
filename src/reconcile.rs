//! Turning a host's desired targets into provider mutations.
use crate::provider::{DnsProvider, ProviderError, RecordType, RetryPolicy};
use crate::store::Targets;
use std::fmt;

/// A single record change to apply at a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetRecord {
        fqdn: String,
        record_type: RecordType,
        target: String,
    },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Mutation::SetRecord {
            fqdn,
            record_type,
            target,
        } = self;
        write!(f, "{record_type} {fqdn} -> {target}")
    }
}

/// The `applied` mutations that re-applying `restore` doesn't overwrite: records of a name and
/// type the restored targets don't set.
#[must_use]
pub fn leftovers(applied: &[Mutation], restore: &[Mutation]) -> Vec<Mutation> {
    let overwrites = |mutation: &Mutation| {
        let Mutation::SetRecord {
            fqdn, record_type, ..
        } = mutation;
        restore.iter().any(|restored| {
            let Mutation::SetRecord {
                fqdn: restored_fqdn,
                record_type: restored_type,
                ..
            } = restored;
            restored_fqdn == fqdn && restored_type == record_type
        })
    };
    applied
        .iter()
        .filter(|mutation| !overwrites(*mutation))
        .cloned()
        .collect()
}

/// The ordered mutations that move `domain` to `targets`.
///
/// Address records come first, `A` then `AAAA`. A CNAME is only set when neither address target
/// is present, since a name can't hold both. No targets at all yields no mutations: the current
/// records are left alone rather than removed.
#[must_use]
pub fn reconcile(domain: &str, targets: &Targets) -> Vec<Mutation> {
    let set = |record_type, target: &String| Mutation::SetRecord {
        fqdn: domain.to_string(),
        record_type,
        target: target.clone(),
    };
    let mut mutations = Vec::with_capacity(2);
    if let Some(a) = &targets.a {
        mutations.push(set(RecordType::A, a));
    }
    if let Some(aaaa) = &targets.aaaa {
        mutations.push(set(RecordType::AAAA, aaaa));
    }
    if mutations.is_empty() {
        if let Some(cname) = &targets.cname {
            mutations.push(set(RecordType::CNAME, cname));
        }
    }
    mutations
}

/// Apply `mutations` in order, retrying each per `retry`. The first failure aborts the rest.
///
/// # Errors
///
/// Returns the error of the first mutation that failed, together with the number of mutations
/// applied before it.
pub async fn apply(
    provider: &dyn DnsProvider,
    mutations: &[Mutation],
    retry: &RetryPolicy,
) -> Result<(), (usize, ProviderError)> {
    for (applied, mutation) in mutations.iter().enumerate() {
        let Mutation::SetRecord {
            fqdn,
            record_type,
            target,
        } = mutation;
        retry
            .run(&format!("set {record_type} {fqdn}"), || {
                provider.set_record(fqdn, *record_type, target)
            })
            .await
            .map_err(|err| (applied, err))?;
    }
    Ok(())
}
