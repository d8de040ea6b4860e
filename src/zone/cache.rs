use super::normalize_name;
use super::record::APEX;
use super::store::RecordStore;
use crate::error::StoreError;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A zone this plugin answers for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Lowercase origin without the trailing dot, empty for the root zone
    pub origin: String,
    /// The zone exactly as stored, used as the lookup key
    pub stored: String,
}

impl Zone {
    pub fn new(stored: &str) -> Self {
        Self {
            origin: normalize_name(stored),
            stored: stored.to_string(),
        }
    }

    /// True if `qname` (normalized) is the origin or below it
    pub fn contains(&self, qname: &str) -> bool {
        self.origin.is_empty()
            || qname == self.origin
            || qname
                .strip_suffix(self.origin.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// Owner name relative to the origin, `@` for the apex
    pub fn relative_name(&self, qname: &str) -> String {
        if qname == self.origin {
            return APEX.to_string();
        }
        if self.origin.is_empty() {
            return qname.to_string();
        }
        qname
            .strip_suffix(self.origin.as_str())
            .and_then(|prefix| prefix.strip_suffix('.'))
            .unwrap_or(qname)
            .to_string()
    }
}

/// One generation of the zone list. Never modified after publication.
#[derive(Debug, Default)]
pub struct ZoneSnapshot {
    pub generation: u64,
    /// Sorted longest origin first so the first match is the closest zone
    zones: Vec<Zone>,
}

impl ZoneSnapshot {
    fn new(generation: u64, stored: Vec<String>) -> Self {
        let mut zones: Vec<Zone> = stored.iter().map(|z| Zone::new(z)).collect();
        zones.sort_by(|a, b| {
            b.origin
                .len()
                .cmp(&a.origin.len())
                .then_with(|| a.origin.cmp(&b.origin))
        });
        zones.dedup_by(|a, b| a.origin == b.origin);
        Self { generation, zones }
    }

    /// Closest enclosing zone of `qname`
    pub fn find_zone(&self, qname: &str) -> Option<&Zone> {
        let qname = normalize_name(qname);
        self.zones.iter().find(|zone| zone.contains(&qname))
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Current zone list, replaced wholesale on refresh.
///
/// Readers take an `Arc` to the current snapshot and keep using it for the
/// whole query, so a concurrent refresh is never observed halfway.
pub struct ZoneCache {
    current: RwLock<Arc<ZoneSnapshot>>,
}

impl ZoneCache {
    /// Empty cache at generation 0
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(ZoneSnapshot::default())),
        }
    }

    pub fn snapshot(&self) -> Arc<ZoneSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Publish a new generation built from `zones`
    pub fn publish(&self, zones: Vec<String>) -> Arc<ZoneSnapshot> {
        let mut current = self.current.write();
        let snapshot = Arc::new(ZoneSnapshot::new(current.generation + 1, zones));
        *current = Arc::clone(&snapshot);
        debug!(
            "Published zone generation {} with {} zones",
            snapshot.generation,
            snapshot.len()
        );
        snapshot
    }

    /// Reload the zone list from `store`.
    ///
    /// On failure the previous generation stays in place.
    pub async fn refresh(&self, store: &dyn RecordStore) -> Result<Arc<ZoneSnapshot>, StoreError> {
        match store.zones().await {
            Ok(zones) => {
                let snapshot = self.publish(zones);
                info!(
                    "Loaded {} zones (generation {})",
                    snapshot.len(),
                    snapshot.generation
                );
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    "Zone refresh failed, keeping generation {}: {}",
                    self.generation(),
                    e
                );
                Err(e)
            }
        }
    }
}

impl Default for ZoneCache {
    fn default() -> Self {
        Self::new()
    }
}
