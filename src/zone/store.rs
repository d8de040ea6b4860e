use super::normalize_name;
use super::record::{APEX, Record, resolve_ttl};
use crate::config::defaults;
use crate::dns::enums::DNSResourceType;
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

/// Read access to zone records.
///
/// Records come back with their TTL resolved: an unset or zero stored TTL
/// reads as the store's default. Zones match after normalization. A lookup
/// without matches is an empty vector, never an error.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records of `rtype` owned by `name` (relative, `@` for the apex) in `zone`
    async fn lookup(
        &self,
        zone: &str,
        name: &str,
        rtype: DNSResourceType,
    ) -> Result<Vec<Record>, StoreError>;

    /// Every zone that has at least one record, as stored
    async fn zones(&self) -> Result<Vec<String>, StoreError>;
}

/// Owner names compare case-insensitively and the apex may be stored as `@` or ``
pub(crate) fn owner_matches(stored: &str, wanted: &str) -> bool {
    let stored = if stored.is_empty() { APEX } else { stored };
    let wanted = if wanted.is_empty() { APEX } else { wanted };
    stored.eq_ignore_ascii_case(wanted)
}

/// In-memory record store for tests and embedding
pub struct MemoryRecordStore {
    records: RwLock<Vec<Record>>,
    default_ttl: u32,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: RwLock::new(records),
            default_ttl: defaults::TTL,
        }
    }

    /// TTL returned for records stored without one
    pub fn with_default_ttl(mut self, ttl: u32) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn insert(&self, record: Record) {
        debug!("Inserting {} record for {}", record.rtype, record.fqdn());
        self.records.write().push(record);
    }

    /// Remove every record of `zone`, returning how many were removed
    pub fn remove_zone(&self, zone: &str) -> usize {
        let zone = normalize_name(zone);
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| normalize_name(&r.zone) != zone);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn lookup(
        &self,
        zone: &str,
        name: &str,
        rtype: DNSResourceType,
    ) -> Result<Vec<Record>, StoreError> {
        let zone = normalize_name(zone);
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| r.rtype == rtype)
            .filter(|r| owner_matches(&r.name, name))
            .filter(|r| normalize_name(&r.zone) == zone)
            .map(|r| Record {
                ttl: Some(resolve_ttl(r.ttl, self.default_ttl)),
                ..r.clone()
            })
            .collect())
    }

    async fn zones(&self) -> Result<Vec<String>, StoreError> {
        let records = self.records.read();
        let mut zones: Vec<String> = Vec::new();
        for record in records.iter() {
            if !zones.contains(&record.zone) {
                zones.push(record.zone.clone());
            }
        }
        Ok(zones)
    }
}
