//! Zone Metadata Cache
//!
//! Process-wide map of zone name -> zone identifier, filled lazily from the
//! zone directory. Readers load the published map without locking; misses
//! are resolved under a mutex and published with a single pointer swap, so
//! a reader never observes a partially built map.
//!
//! Entries are held for the process lifetime. Zone identifiers are treated
//! as immutable, and unknown zones are not cached.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{canonical_name, ApiError, ZoneApi, ZoneInfo};

pub struct ZoneMetadataCache {
    api: Arc<dyn ZoneApi>,
    /// Serializes directory lookups
    lock: Mutex<()>,
    zones: ArcSwap<HashMap<String, ZoneInfo>>,
}

impl ZoneMetadataCache {
    pub fn new(api: Arc<dyn ZoneApi>) -> Self {
        Self {
            api,
            lock: Mutex::new(()),
            zones: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Resolve a zone name.
    ///
    /// Returns `Ok(None)` when the directory has no such zone and an error
    /// only when the directory lookup itself failed.
    pub async fn resolve(&self, name: &str) -> Result<Option<ZoneInfo>, ApiError> {
        let key = canonical_name(name);

        if let Some(zone) = self.zones.load().get(&key) {
            return Ok(Some(zone.clone()));
        }

        let _guard = self.lock.lock().await;

        // Another request may have filled it while we waited
        let current = self.zones.load_full();
        if let Some(zone) = current.get(&key) {
            return Ok(Some(zone.clone()));
        }

        debug!("Zone cache miss for {}, listing zones", key);
        let listed = self.api.list_zones(name).await?;
        if listed.is_empty() {
            return Ok(None);
        }

        let mut zones: HashMap<String, ZoneInfo> = (*current).clone();
        for zone in listed {
            info!("Cached zone {} ({})", zone.name, zone.id);
            zones.insert(canonical_name(&zone.name), zone);
        }
        let found = zones.get(&key).cloned();
        self.zones.store(Arc::new(zones));

        Ok(found)
    }

    /// Number of cached zones
    pub fn len(&self) -> usize {
        self.zones.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.load().is_empty()
    }
}
