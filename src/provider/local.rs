//! The `"local"` provider: zones held in-process.
//!
//! Records live in a [`RecordTable`] shared with the [embedded DNS server][crate::dns], which
//! answers queries for them authoritatively. The table can optionally be mirrored to a JSON
//! [`StateFile`] so it survives restarts.
use crate::provider::{fqdn, DnsProvider, ProviderError, RecordType};
use crate::state_file::StateFile;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use trust_dns_client::rr::Name;

/// A [`RecordTable`] shared between the provider and the DNS server.
pub type SharedRecordTable = Arc<RwLock<RecordTable>>;

/// DNS-01 validation of an apex and its wildcard needs two TXT values at the same name.
const MAX_TXT_VALUES: usize = 2;

lazy_static! {
    static ref SERIAL_FORMATTER: &'static [time::format_description::FormatItem<'static>] =
        format_description!(version = 2, "[year][month][day]");
}

/// The records held at one name.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    pub a: Option<Ipv4Addr>,
    pub aaaa: Option<Ipv6Addr>,
    pub cname: Option<String>,
    pub txt: VecDeque<String>,
}

impl RecordSet {
    fn is_empty(&self) -> bool {
        self.a.is_none() && self.aaaa.is_none() && self.cname.is_none() && self.txt.is_empty()
    }
}

/// The zones served by a [`LocalProvider`] and the records within them, keyed by canonical FQDN.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RecordTable {
    zones: BTreeMap<String, u32>,
    records: HashMap<String, RecordSet>,
}

impl RecordTable {
    /// The configured zone apex that `name` belongs to, walking up the label hierarchy.
    #[must_use]
    pub fn zone_of(&self, name: &Name) -> Option<String> {
        find_zone(&self.zones, name)
    }

    #[must_use]
    pub fn get(&self, fqdn: &str) -> Option<&RecordSet> {
        self.records.get(fqdn)
    }

    /// The SOA serial of a zone apex, if the zone is served.
    #[must_use]
    pub fn serial(&self, zone: &str) -> Option<u32> {
        self.zones.get(zone).copied()
    }

    pub fn zones(&self) -> impl Iterator<Item = &String> {
        self.zones.keys()
    }

    fn ensure_zones(&mut self, zones: &[Name]) {
        let wanted: Vec<String> = zones.iter().map(Name::to_ascii).collect();
        self.zones.retain(|zone, _| wanted.contains(zone));
        for zone in wanted {
            self.zones.entry(zone).or_insert_with(|| today_serial(0));
        }
        let zones = &self.zones;
        self.records.retain(|fqdn, _| {
            Name::from_str(fqdn)
                .map(|name| find_zone(zones, &name).is_some())
                .unwrap_or(false)
        });
    }

    /// Apply a record change. Returns whether anything changed.
    fn set(
        &mut self,
        owner: &str,
        record_type: RecordType,
        target: &str,
    ) -> Result<bool, ProviderError> {
        let invalid = || ProviderError::InvalidTarget {
            record_type,
            target: target.to_string(),
        };
        let mut set = self.records.get(owner).cloned().unwrap_or_default();
        match record_type {
            RecordType::A => {
                set.a = Some(Ipv4Addr::from_str(target.trim()).map_err(|_| invalid())?);
                set.cname = None;
            }
            RecordType::AAAA => {
                set.aaaa = Some(Ipv6Addr::from_str(target.trim()).map_err(|_| invalid())?);
                set.cname = None;
            }
            RecordType::CNAME => {
                set.cname = Some(fqdn(target.trim()).map_err(|_| invalid())?.to_ascii());
                set.a = None;
                set.aaaa = None;
            }
            RecordType::TXT => {
                if !set.txt.iter().any(|v| v == target) {
                    set.txt.push_front(target.to_string());
                    set.txt.truncate(MAX_TXT_VALUES);
                }
            }
        }
        if self.records.get(owner) == Some(&set) {
            return Ok(false);
        }
        self.records.insert(owner.to_string(), set);
        Ok(true)
    }

    fn remove_txt(&mut self, fqdn: &str) -> bool {
        let Some(set) = self.records.get_mut(fqdn) else {
            return false;
        };
        let changed = !set.txt.is_empty();
        set.txt.clear();
        if set.is_empty() {
            self.records.remove(fqdn);
        }
        changed
    }

    fn bump_serial(&mut self, zone: &str) {
        if let Some(serial) = self.zones.get_mut(zone) {
            *serial = today_serial(*serial);
        }
    }
}

fn find_zone(zones: &BTreeMap<String, u32>, name: &Name) -> Option<String> {
    let mut candidate = name.clone();
    candidate.set_fqdn(true);
    loop {
        let key = candidate.to_ascii();
        if zones.contains_key(&key) {
            return Some(key);
        }
        if candidate.is_root() {
            return None;
        }
        candidate = candidate.base_name();
    }
}

/// The next serial after `current`: today's date with a two digit revision, or `current + 1` if
/// that is already past today.
fn today_serial(current: u32) -> u32 {
    // NB: the date format always yields eight digits, which parse as u32.
    let today: u32 = OffsetDateTime::now_utc()
        .format(&SERIAL_FORMATTER)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    today.saturating_mul(100).max(current.wrapping_add(1))
}

/// Serves configured zones from an in-process [`RecordTable`].
pub struct LocalProvider {
    table: SharedRecordTable,
    state: Option<PersistState>,
}

struct PersistState {
    file: StateFile<RecordTable>,
    // Set when a change was applied in memory but failed to reach disk.
    dirty: Mutex<bool>,
}

impl LocalProvider {
    /// Create a provider serving `zones`, keeping records in memory only.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidName`] if a zone isn't a valid DNS name.
    pub fn new(zones: &[String]) -> Result<Self, ProviderError> {
        let mut table = RecordTable::default();
        table.ensure_zones(&parse_zones(zones)?);
        Ok(Self {
            table: Arc::new(RwLock::new(table)),
            state: None,
        })
    }

    /// Create a provider serving `zones`, loading and saving records at `path`.
    ///
    /// Records for names outside the configured zones are dropped on load.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::IO`] if the state file can't be read or created and
    /// [`crate::error::Error::Provider`] if a zone isn't a valid DNS name.
    pub async fn persistent(
        zones: &[String],
        path: impl AsRef<Path>,
    ) -> Result<Self, crate::error::Error> {
        let zones = parse_zones(zones)?;
        let (file, mut table) = StateFile::<RecordTable>::open(path).await?;
        table.ensure_zones(&zones);
        file.save(&table).await?;
        Ok(Self {
            table: Arc::new(RwLock::new(table)),
            state: Some(PersistState {
                file,
                dirty: Mutex::new(false),
            }),
        })
    }

    async fn persist(&self, table: &RecordTable, changed: bool) -> Result<(), ProviderError> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        let mut dirty = state.dirty.lock().await;
        if !changed && !*dirty {
            return Ok(());
        }
        match state.file.save(table).await {
            Ok(()) => {
                *dirty = false;
                Ok(())
            }
            Err(err) => {
                *dirty = true;
                Err(ProviderError::Persist(err.to_string()))
            }
        }
    }

    fn zone_for(table: &RecordTable, name: &Name) -> Result<String, ProviderError> {
        table
            .zone_of(name)
            .ok_or_else(|| ProviderError::ZoneNotFound(name.to_ascii()))
    }
}

fn parse_zones(zones: &[String]) -> Result<Vec<Name>, ProviderError> {
    zones.iter().map(|zone| fqdn(zone)).collect()
}

#[async_trait::async_trait]
impl DnsProvider for LocalProvider {
    async fn set_record(
        &self,
        fqdn_str: &str,
        record_type: RecordType,
        target: &str,
    ) -> Result<(), ProviderError> {
        let name = fqdn(fqdn_str)?;
        let mut table = self.table.write().await;
        Self::zone_for(&table, &name)?;
        let changed = table.set(&name.to_ascii(), record_type, target)?;
        if changed {
            tracing::info!("set {record_type} {name} -> {target}");
        }
        self.persist(&table, changed).await
    }

    async fn remove_records(&self, fqdn_str: &str) -> Result<(), ProviderError> {
        let name = fqdn(fqdn_str)?;
        let mut table = self.table.write().await;
        let changed = table.remove_txt(&name.to_ascii());
        if changed {
            tracing::info!("removed TXT records at {name}");
        }
        self.persist(&table, changed).await
    }

    async fn extract_auth_zone(&self, fqdn_str: &str) -> Result<String, ProviderError> {
        let name = fqdn(fqdn_str)?;
        let table = self.table.read().await;
        Self::zone_for(&table, &name)
    }

    async fn refresh(&self, fqdn_str: &str) -> Result<(), ProviderError> {
        let name = fqdn(fqdn_str)?;
        let mut table = self.table.write().await;
        let zone = Self::zone_for(&table, &name)?;
        table.bump_serial(&zone);
        tracing::debug!("refreshed zone {zone}, serial {:?}", table.serial(&zone));
        self.persist(&table, true).await
    }

    fn record_table(&self) -> Option<SharedRecordTable> {
        Some(self.table.clone())
    }
}
