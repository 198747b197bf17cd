//! Zone Snapshots
//!
//! In-memory tree of a zone's record sets as last listed from the zone
//! management API. A snapshot is the diff baseline for update requests and
//! the read path for prerequisite lookups. Snapshots are rebuilt from
//! scratch on every sync and published only when the full listing succeeded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{canonical_name, is_in_zone, DnsError, DnsRecordType, RecordSet, ZoneApi, ZoneInfo};

/// Record sets of one zone indexed by owner name, then type
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    zone: ZoneInfo,
    apex: String,
    nodes: BTreeMap<String, BTreeMap<DnsRecordType, RecordSet>>,
    synced_at: u64,
}

impl ZoneSnapshot {
    /// Create an empty snapshot
    pub fn new(zone: ZoneInfo) -> Self {
        let apex = canonical_name(&zone.name);
        Self {
            zone,
            apex,
            nodes: BTreeMap::new(),
            synced_at: current_timestamp(),
        }
    }

    pub fn zone(&self) -> &ZoneInfo {
        &self.zone
    }

    /// Canonical apex name
    pub fn apex(&self) -> &str {
        &self.apex
    }

    /// Unix time the snapshot was built
    pub fn synced_at(&self) -> u64 {
        self.synced_at
    }

    /// Insert a record set, returning the set it replaced
    pub fn insert(&mut self, set: RecordSet) -> Option<RecordSet> {
        self.nodes
            .entry(set.name().to_string())
            .or_default()
            .insert(set.record_type(), set)
    }

    /// Whether a name is at or below the apex
    pub fn contains_name(&self, name: &str) -> bool {
        is_in_zone(&canonical_name(name), &self.apex)
    }

    /// Record set at a name and type
    pub fn rrset(&self, name: &str, record_type: DnsRecordType) -> Option<&RecordSet> {
        self.nodes
            .get(&canonical_name(name))
            .and_then(|node| node.get(&record_type))
    }

    /// Every record set at a name
    pub fn rrsets_at(&self, name: &str) -> impl Iterator<Item = &RecordSet> {
        self.nodes
            .get(&canonical_name(name))
            .into_iter()
            .flat_map(|node| node.values())
    }

    /// Whether any non-empty record set exists at a name
    pub fn name_exists(&self, name: &str) -> bool {
        self.rrsets_at(name).any(|set| !set.is_empty())
    }

    /// Answer a type lookup, falling back to a CNAME at the name
    pub fn lookup(&self, name: &str, record_type: DnsRecordType) -> Option<&RecordSet> {
        self.rrset(name, record_type)
            .filter(|set| !set.is_empty())
            .or_else(|| {
                self.rrset(name, DnsRecordType::CNAME)
                    .filter(|set| !set.is_empty())
            })
    }

    /// Number of owner names
    pub fn name_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of record sets across all names
    pub fn rrset_count(&self) -> usize {
        self.nodes.values().map(BTreeMap::len).sum()
    }
}

/// Builds and publishes zone snapshots from the zone management API
pub struct ZoneSynchronizer {
    api: Arc<dyn ZoneApi>,
    page_size: usize,
    /// Map of zone id -> last published snapshot
    snapshots: RwLock<HashMap<String, Arc<ZoneSnapshot>>>,
}

impl ZoneSynchronizer {
    pub fn new(api: Arc<dyn ZoneApi>, page_size: usize) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Re-list every record of the zone and publish the new snapshot.
    ///
    /// A failed page leaves the previously published snapshot in place.
    pub async fn sync(&self, zone: &ZoneInfo) -> Result<Arc<ZoneSnapshot>, DnsError> {
        let snapshot = Arc::new(self.fetch(zone).await?);

        info!(
            "Synced zone {} ({}): {} names, {} rrsets",
            zone.name,
            zone.id,
            snapshot.name_count(),
            snapshot.rrset_count()
        );

        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(zone.id.clone(), Arc::clone(&snapshot));

        Ok(snapshot)
    }

    /// Last published snapshot of a zone
    pub async fn current(&self, zone_id: &str) -> Option<Arc<ZoneSnapshot>> {
        let snapshots = self.snapshots.read().await;
        snapshots.get(zone_id).cloned()
    }

    async fn fetch(&self, zone: &ZoneInfo) -> Result<ZoneSnapshot, DnsError> {
        let mut snapshot = ZoneSnapshot::new(zone.clone());
        let mut offset = 0;

        loop {
            let page = self
                .api
                .list_records(&zone.id, offset, self.page_size)
                .await
                .map_err(|source| DnsError::Sync {
                    zone: zone.name.clone(),
                    source,
                })?;

            let fetched = page.records.len();
            debug!("Listed {} records of {} at offset {}", fetched, zone.name, offset);

            for record in &page.records {
                match RecordSet::from_remote(record) {
                    Ok(set) => {
                        if snapshot.insert(set).is_some() {
                            warn!("Duplicate rrset {} {} in zone {}", record.name, record.rrtype, zone.name);
                        }
                    }
                    Err(e) => {
                        warn!("Skipping record {} {} in zone {}: {}", record.name, record.rrtype, zone.name, e);
                    }
                }
            }

            offset += fetched;
            let exhausted = page.total.map_or(false, |total| offset >= total);
            if fetched < self.page_size || exhausted {
                break;
            }
        }

        Ok(snapshot)
    }
}

/// Get current Unix timestamp
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
