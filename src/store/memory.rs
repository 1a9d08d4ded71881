//! An in-process implementation of the [`Store`][super::Store] trait.
//!
//! Committed [`Tables`] sit behind a [`RwLock`] so snapshot reads never wait on a slow
//! transaction. Each transaction records its own host and principal writes and merges them onto
//! the latest committed tables when it commits.
//!
//! Writers are serialized per host: a transaction locks every host it reads for update or
//! writes, holding the owned guards until it commits or is dropped. Principal changes share one
//! lock. Transactions over different hosts never wait on each other.
//!
//! With a [`StateFile`] attached, the merged tables are written to disk before a commit becomes
//! visible; a failed write fails the commit and leaves the committed tables untouched.
use crate::state_file::StateFile;
use crate::store::{Host, Principal, Store, StoreError, Tables, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Clone, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    committed: RwLock<Tables>,
    // Held while merging so concurrent commits never overwrite each other.
    commit: Mutex<()>,
    host_locks: HostLocks,
    principals: Arc<Mutex<()>>,
    state_file: Option<StateFile<Tables>>,
}

/// One lock per host domain, created on demand.
#[derive(Default)]
struct HostLocks(std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>);

impl HostLocks {
    fn get(&self, domain: &str) -> Arc<Mutex<()>> {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        // Locks nobody holds or waits for are only referenced from the map.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(domain.to_string()).or_default().clone()
    }
}

impl InMemoryStore {
    /// Create an empty store that isn't durable across restarts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from the JSON state at the given path, creating an empty state file if none
    /// exists. Every commit is written back to the file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Persist`] if the path can't be opened, read or created, or doesn't
    /// hold valid store state.
    pub async fn persistent(p: impl AsRef<Path>) -> Result<Self, StoreError> {
        let (state_file, tables) = StateFile::<Tables>::open(p)
            .await
            .map_err(StoreError::Persist)?;
        Ok(Self {
            inner: Arc::new(Inner {
                committed: RwLock::new(tables),
                state_file: Some(state_file),
                ..Inner::default()
            }),
        })
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            store: self.inner.clone(),
            hosts: BTreeMap::new(),
            principals: BTreeMap::new(),
            host_guards: HashMap::new(),
            principals_guard: None,
        }))
    }

    async fn principal(&self, name: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self.inner.committed.read().await.principals.get(name).cloned())
    }

    async fn host(&self, domain: &str) -> Result<Option<Host>, StoreError> {
        Ok(self.inner.committed.read().await.hosts.get(domain).cloned())
    }

    async fn hosts(&self) -> Result<Vec<Host>, StoreError> {
        Ok(self.inner.committed.read().await.hosts.values().cloned().collect())
    }
}

struct InMemoryTransaction {
    store: Arc<Inner>,
    hosts: BTreeMap<String, Host>,
    // `None` marks a deleted principal.
    principals: BTreeMap<String, Option<Principal>>,
    host_guards: HashMap<String, OwnedMutexGuard<()>>,
    principals_guard: Option<OwnedMutexGuard<()>>,
}

impl InMemoryTransaction {
    async fn lock_principals(&mut self) {
        if self.principals_guard.is_none() {
            self.principals_guard = Some(self.store.principals.clone().lock_owned().await);
        }
    }

    async fn principal(&self, name: &str) -> Option<Principal> {
        match self.principals.get(name) {
            Some(staged) => staged.clone(),
            None => self.store.committed.read().await.principals.get(name).cloned(),
        }
    }
}

#[async_trait::async_trait]
impl Transaction for InMemoryTransaction {
    async fn lock_host(&mut self, domain: &str) -> Result<(), StoreError> {
        if !self.host_guards.contains_key(domain) {
            let guard = self.store.host_locks.get(domain).lock_owned().await;
            self.host_guards.insert(domain.to_string(), guard);
        }
        Ok(())
    }

    async fn try_lock_host(&mut self, domain: &str) -> Result<bool, StoreError> {
        if self.host_guards.contains_key(domain) {
            return Ok(true);
        }
        match self.store.host_locks.get(domain).try_lock_owned() {
            Ok(guard) => {
                self.host_guards.insert(domain.to_string(), guard);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn host(&self, domain: &str) -> Result<Option<Host>, StoreError> {
        if let Some(host) = self.hosts.get(domain) {
            return Ok(Some(host.clone()));
        }
        Ok(self.store.committed.read().await.hosts.get(domain).cloned())
    }

    async fn upsert_host(&mut self, host: Host) -> Result<(), StoreError> {
        self.lock_host(&host.domain).await?;
        if let Some(existing) = self.host(&host.domain).await? {
            if existing.owner != host.owner {
                return Err(StoreError::HostOwned {
                    domain: host.domain,
                });
            }
        }
        self.hosts.insert(host.domain.clone(), host);
        Ok(())
    }

    async fn hosts_owned_by(&self, owner: &str) -> Result<Vec<Host>, StoreError> {
        let committed = self.store.committed.read().await;
        let mut hosts: BTreeMap<&str, &Host> = committed
            .hosts
            .iter()
            .map(|(domain, host)| (domain.as_str(), host))
            .collect();
        hosts.extend(self.hosts.iter().map(|(domain, host)| (domain.as_str(), host)));
        Ok(hosts
            .into_values()
            .filter(|host| host.owner == owner)
            .cloned()
            .collect())
    }

    async fn count_principals(&mut self, name: &str) -> Result<usize, StoreError> {
        self.lock_principals().await;
        Ok(usize::from(self.principal(name).await.is_some()))
    }

    async fn insert_principal(&mut self, principal: Principal) -> Result<(), StoreError> {
        self.lock_principals().await;
        if self.principal(&principal.name).await.is_some() {
            return Err(StoreError::DuplicatePrincipal(principal.name));
        }
        self.principals
            .insert(principal.name.clone(), Some(principal));
        Ok(())
    }

    async fn delete_principal(&mut self, name: &str) -> Result<bool, StoreError> {
        self.lock_principals().await;
        let existed = self.principal(name).await.is_some();
        if existed {
            self.principals.insert(name.to_string(), None);
        }
        Ok(existed)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction {
            store,
            hosts,
            principals,
            host_guards: _host_guards,
            principals_guard: _principals_guard,
        } = *self;
        if hosts.is_empty() && principals.is_empty() {
            return Ok(());
        }

        let _merging = store.commit.lock().await;
        let mut tables = store.committed.read().await.clone();
        tables.hosts.extend(hosts);
        for (name, principal) in principals {
            match principal {
                Some(principal) => tables.principals.insert(name, principal),
                None => tables.principals.remove(&name),
            };
        }
        if let Some(state_file) = &store.state_file {
            state_file.save(&tables).await.map_err(StoreError::Persist)?;
        }
        *store.committed.write().await = tables;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
