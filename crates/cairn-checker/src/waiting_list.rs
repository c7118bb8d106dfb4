//! Bounded list of regions whose repair was deferred by a schedule limit.
//!
//! Entries are kept in insertion order. When the list is full the oldest
//! entry is evicted, so the list never grows past its capacity no matter
//! how many regions a sweep defers. The driver loop retries entries on its
//! next pass; nothing here re-validates membership.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use cairn_types::RegionId;

/// Fixed-capacity, insertion-ordered set of region IDs.
///
/// All operations take `&self` and are safe to call from many driver
/// workers at once.
#[derive(Debug)]
pub struct RegionWaitingList {
    capacity: usize,
    inner: Mutex<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    next_seq: u64,
    /// Insertion sequence -> region; the first entry is the oldest.
    by_seq: BTreeMap<u64, RegionId>,
    by_region: HashMap<RegionId, u64>,
}

impl RegionWaitingList {
    /// Creates an empty waiting list.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "waiting list capacity must be positive");
        Self {
            capacity,
            inner: Mutex::new(Entries::default()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a region, or moves it to the newest position if present.
    ///
    /// Evicts the oldest entries while the list is over capacity.
    pub fn put(&self, region_id: RegionId) {
        let mut entries = self.entries();
        if let Some(old_seq) = entries.by_region.remove(&region_id) {
            entries.by_seq.remove(&old_seq);
        }

        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.by_seq.insert(seq, region_id);
        entries.by_region.insert(region_id, seq);

        while entries.by_seq.len() > self.capacity {
            if let Some((_, evicted)) = entries.by_seq.pop_first() {
                entries.by_region.remove(&evicted);
                tracing::trace!(region = %evicted, "evicted from waiting list");
            }
        }
    }

    /// Removes a region. Returns true if it was present.
    pub fn remove(&self, region_id: RegionId) -> bool {
        let mut entries = self.entries();
        match entries.by_region.remove(&region_id) {
            Some(seq) => {
                entries.by_seq.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, region_id: RegionId) -> bool {
        self.entries().by_region.contains_key(&region_id)
    }

    /// Returns all waiting regions, oldest first.
    pub fn elems(&self) -> Vec<RegionId> {
        self.entries().by_seq.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().by_seq.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<RegionId> {
        raw.iter().copied().map(RegionId::new).collect()
    }

    #[test]
    fn put_and_enumerate_in_insertion_order() {
        let list = RegionWaitingList::new(10);
        list.put(RegionId::new(3));
        list.put(RegionId::new(1));
        list.put(RegionId::new(2));

        assert_eq!(list.elems(), ids(&[3, 1, 2]));
        assert_eq!(list.len(), 3);
        assert!(list.contains(RegionId::new(1)));
    }

    #[test]
    fn duplicate_put_refreshes_position() {
        let list = RegionWaitingList::new(10);
        list.put(RegionId::new(1));
        list.put(RegionId::new(2));
        list.put(RegionId::new(1));

        assert_eq!(list.elems(), ids(&[2, 1]));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let list = RegionWaitingList::new(3);
        for id in 1..=5 {
            list.put(RegionId::new(id));
        }

        assert_eq!(list.elems(), ids(&[3, 4, 5]));
        assert!(!list.contains(RegionId::new(1)));
        assert!(!list.contains(RegionId::new(2)));
    }

    #[test]
    fn refreshed_entry_survives_eviction() {
        let list = RegionWaitingList::new(2);
        list.put(RegionId::new(1));
        list.put(RegionId::new(2));
        list.put(RegionId::new(1));
        list.put(RegionId::new(3));

        assert_eq!(list.elems(), ids(&[1, 3]));
    }

    #[test]
    fn remove_reports_presence() {
        let list = RegionWaitingList::new(4);
        list.put(RegionId::new(7));

        assert!(list.remove(RegionId::new(7)));
        assert!(!list.remove(RegionId::new(7)));
        assert!(list.is_empty());
    }

    #[test]
    #[should_panic(expected = "waiting list capacity must be positive")]
    fn zero_capacity_panics() {
        let _list = RegionWaitingList::new(0);
    }
}
