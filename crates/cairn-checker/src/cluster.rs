//! Read access to cluster state for the checkers.
//!
//! [`ClusterInformer`] is the seam between the checkers and whatever keeps
//! the authoritative region/store view. [`InMemoryCluster`] is a complete
//! implementation backed by ordered maps; embedders and tests feed it
//! heartbeats through `put_region` / `put_store`.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use cairn_config::{CairnConfig, ScheduleOptions};
use cairn_types::{RegionId, RegionInfo, StoreId, StoreInfo, StoreState};

/// Snapshot provider consumed by the checkers.
///
/// Implementations must be cheap to query and safe to share across the
/// driver's worker threads.
pub trait ClusterInformer: Send + Sync {
    /// Live scheduling options.
    fn options(&self) -> &ScheduleOptions;

    fn get_region(&self, id: RegionId) -> Option<RegionInfo>;

    fn get_store(&self, id: StoreId) -> Option<StoreInfo>;

    /// Returns all known stores, ordered by ID.
    fn get_stores(&self) -> Vec<StoreInfo>;

    /// Returns up to `limit` regions in key order starting at the region
    /// that contains `start_key`.
    fn scan_regions(&self, start_key: &[u8], limit: usize) -> Vec<RegionInfo>;

    /// Returns the regions directly before and after `region` in key order.
    fn get_adjacent_regions(&self, region: &RegionInfo)
    -> (Option<RegionInfo>, Option<RegionInfo>);

    /// Allocates a cluster-unique ID for a new peer.
    fn alloc_id(&self) -> u64;
}

/// Region and store registry kept entirely in memory.
#[derive(Debug)]
pub struct InMemoryCluster {
    options: ScheduleOptions,
    state: RwLock<ClusterState>,
    next_id: AtomicU64,
}

#[derive(Debug, Default)]
struct ClusterState {
    /// Regions keyed by start key.
    regions: BTreeMap<Bytes, RegionInfo>,
    region_keys: HashMap<RegionId, Bytes>,
    stores: BTreeMap<StoreId, StoreInfo>,
}

/// First ID handed out by [`InMemoryCluster::alloc_id`].
const FIRST_ALLOC_ID: u64 = 1000;

impl InMemoryCluster {
    pub fn new(config: CairnConfig) -> Self {
        Self {
            options: ScheduleOptions::new(config),
            state: RwLock::new(ClusterState::default()),
            next_id: AtomicU64::new(FIRST_ALLOC_ID),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ClusterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ClusterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces a region.
    ///
    /// The previous version of the region and every other region whose
    /// key range overlaps the new one are dropped.
    pub fn put_region(&self, region: RegionInfo) {
        let mut state = self.write();
        if let Some(old_key) = state.region_keys.remove(&region.id()) {
            state.regions.remove(&old_key);
        }

        let upper = if region.end_key().is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(region.end_key())
        };
        // Stored regions never overlap, so walking back from the new end key
        // stops at the first region ending at or before the new start key.
        let overlapping: Vec<Bytes> = state
            .regions
            .range::<[u8], _>((Bound::Unbounded, upper))
            .rev()
            .take_while(|(_, old)| old.end_key().is_empty() || old.end_key() > region.start_key())
            .map(|(key, _)| key.clone())
            .collect();
        for key in overlapping {
            if let Some(displaced) = state.regions.remove(&key) {
                state.region_keys.remove(&displaced.id());
            }
        }

        let key = Bytes::copy_from_slice(region.start_key());
        state.region_keys.insert(region.id(), key.clone());
        state.regions.insert(key, region);
    }

    pub fn remove_region(&self, id: RegionId) -> Option<RegionInfo> {
        let mut state = self.write();
        let key = state.region_keys.remove(&id)?;
        state.regions.remove(&key)
    }

    pub fn put_store(&self, store: StoreInfo) {
        self.write().stores.insert(store.id, store);
    }

    /// Changes a store's state. Returns false if the store is unknown.
    pub fn set_store_state(&self, id: StoreId, store_state: StoreState) -> bool {
        match self.write().stores.get_mut(&id) {
            Some(store) => {
                store.state = store_state;
                true
            }
            None => false,
        }
    }

    pub fn region_count(&self) -> usize {
        self.read().regions.len()
    }
}

impl ClusterInformer for InMemoryCluster {
    fn options(&self) -> &ScheduleOptions {
        &self.options
    }

    fn get_region(&self, id: RegionId) -> Option<RegionInfo> {
        let state = self.read();
        let key = state.region_keys.get(&id)?;
        state.regions.get(key).cloned()
    }

    fn get_store(&self, id: StoreId) -> Option<StoreInfo> {
        self.read().stores.get(&id).cloned()
    }

    fn get_stores(&self) -> Vec<StoreInfo> {
        self.read().stores.values().cloned().collect()
    }

    fn scan_regions(&self, start_key: &[u8], limit: usize) -> Vec<RegionInfo> {
        let state = self.read();

        // Include the region that contains `start_key`, not only those
        // starting at or after it.
        let first = state
            .regions
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(start_key)))
            .next_back()
            .filter(|(_, region)| region.contains_key(start_key))
            .map(|(key, _)| key.clone());

        let lower = first.unwrap_or_else(|| Bytes::copy_from_slice(start_key));
        state
            .regions
            .range(lower..)
            .take(limit)
            .map(|(_, region)| region.clone())
            .collect()
    }

    fn get_adjacent_regions(
        &self,
        region: &RegionInfo,
    ) -> (Option<RegionInfo>, Option<RegionInfo>) {
        let state = self.read();

        let prev = if region.start_key().is_empty() {
            None
        } else {
            state
                .regions
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(region.start_key())))
                .next_back()
                .map(|(_, prev)| prev)
                .filter(|prev| prev.end_key() == region.start_key())
                .cloned()
        };

        let next = if region.end_key().is_empty() {
            None
        } else {
            state.regions.get(region.end_key()).cloned()
        };

        (prev, next)
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::Peer;

    fn region(id: u64, start: &'static str, end: &'static str) -> RegionInfo {
        RegionInfo::new(RegionId::new(id), start, end, vec![Peer::voter(id * 10, 1)])
    }

    fn cluster_with_three_regions() -> InMemoryCluster {
        let cluster = InMemoryCluster::new(CairnConfig::default());
        cluster.put_region(region(1, "", "g"));
        cluster.put_region(region(2, "g", "p"));
        cluster.put_region(region(3, "p", ""));
        cluster
    }

    #[test]
    fn adjacent_regions_follow_key_order() {
        let cluster = cluster_with_three_regions();

        let middle = cluster.get_region(RegionId::new(2)).unwrap();
        let (prev, next) = cluster.get_adjacent_regions(&middle);
        assert_eq!(prev.map(|r| r.id()), Some(RegionId::new(1)));
        assert_eq!(next.map(|r| r.id()), Some(RegionId::new(3)));

        let first = cluster.get_region(RegionId::new(1)).unwrap();
        let (prev, next) = cluster.get_adjacent_regions(&first);
        assert!(prev.is_none());
        assert_eq!(next.map(|r| r.id()), Some(RegionId::new(2)));

        let last = cluster.get_region(RegionId::new(3)).unwrap();
        assert!(cluster.get_adjacent_regions(&last).1.is_none());
    }

    #[test]
    fn gap_in_key_space_breaks_adjacency() {
        let cluster = InMemoryCluster::new(CairnConfig::default());
        cluster.put_region(region(1, "a", "c"));
        cluster.put_region(region(2, "d", "f"));

        let second = cluster.get_region(RegionId::new(2)).unwrap();
        assert!(cluster.get_adjacent_regions(&second).0.is_none());
    }

    #[test]
    fn scan_starts_at_containing_region() {
        let cluster = cluster_with_three_regions();

        let ids: Vec<_> = cluster
            .scan_regions(b"h", 10)
            .iter()
            .map(RegionInfo::id)
            .collect();
        assert_eq!(ids, vec![RegionId::new(2), RegionId::new(3)]);

        assert_eq!(cluster.scan_regions(b"", 2).len(), 2);
    }

    #[test]
    fn put_region_replaces_previous_version() {
        let cluster = cluster_with_three_regions();
        // Region 2 shrinks after a split created region 4.
        cluster.put_region(region(2, "g", "k"));
        cluster.put_region(region(4, "k", "p"));

        assert_eq!(cluster.region_count(), 4);
        assert_eq!(cluster.get_region(RegionId::new(2)).unwrap().end_key(), b"k");

        assert!(cluster.remove_region(RegionId::new(4)).is_some());
        assert!(cluster.get_region(RegionId::new(4)).is_none());
        assert_eq!(cluster.region_count(), 3);
    }

    #[test]
    fn put_region_drops_overlapping_regions() {
        let cluster = cluster_with_three_regions();
        // Regions 1 and 2 merge into 5, which also swallows the head of 3.
        cluster.put_region(region(5, "", "r"));

        assert_eq!(cluster.region_count(), 1);
        assert!(cluster.get_region(RegionId::new(1)).is_none());
        assert!(cluster.get_region(RegionId::new(2)).is_none());
        assert!(cluster.get_region(RegionId::new(3)).is_none());

        // A region inside another's range replaces it; neighbours stay.
        let cluster = cluster_with_three_regions();
        cluster.put_region(region(6, "h", "k"));
        let ids: Vec<_> = cluster
            .scan_regions(b"", 10)
            .iter()
            .map(RegionInfo::id)
            .collect();
        assert_eq!(ids, vec![RegionId::new(1), RegionId::new(6), RegionId::new(3)]);

        let inner = cluster.get_region(RegionId::new(6)).unwrap();
        let (prev, next) = cluster.get_adjacent_regions(&inner);
        assert!(prev.is_none());
        assert!(next.is_none());
    }

    #[test]
    fn store_state_updates() {
        let cluster = InMemoryCluster::new(CairnConfig::default());
        cluster.put_store(StoreInfo::new(1));

        assert!(cluster.set_store_state(StoreId::new(1), StoreState::Offline));
        assert!(!cluster.set_store_state(StoreId::new(9), StoreState::Offline));
        assert!(cluster.get_store(StoreId::new(1)).unwrap().is_removing());
    }

    #[test]
    fn alloc_id_is_unique() {
        let cluster = InMemoryCluster::new(CairnConfig::default());
        let a = cluster.alloc_id();
        let b = cluster.alloc_id();
        assert_ne!(a, b);
    }
}
