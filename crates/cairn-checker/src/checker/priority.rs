//! Fit assessment and the queue of regions short on replicas.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use cairn_types::{RegionId, RegionInfo};

use crate::checker::{Checker, CheckerKind};
use crate::cluster::ClusterInformer;
use crate::pause::PauseController;
use crate::placement::{RegionFit, RuleManager};

/// A region waiting for replicas to be made up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityEntry {
    pub region_id: RegionId,
    /// Number of replicas the region is short of; larger is more urgent.
    pub priority: usize,
    /// How many times the region has been seen short of replicas.
    pub attempt: u32,
    last: Instant,
}

impl PriorityEntry {
    /// When the entry is next due; `None` if that lies beyond what
    /// `Instant` can represent, in which case it is never due.
    fn ready_at(&self, retry_interval: Duration) -> Option<Instant> {
        self.last.checked_add(retry_interval.saturating_mul(self.attempt))
    }
}

/// Computes a region's placement fit and tracks regions short of replicas.
///
/// The fit gates the rule checker. Regions that still miss replicas are
/// queued with a priority equal to the number of replicas they lack; each
/// repeated sighting pushes their next retry further out.
pub struct PriorityChecker {
    cluster: Arc<dyn ClusterInformer>,
    rule_manager: Arc<RuleManager>,
    capacity: usize,
    queue: Mutex<HashMap<RegionId, PriorityEntry>>,
    pause: PauseController,
}

impl PriorityChecker {
    /// Creates the checker.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(
        cluster: Arc<dyn ClusterInformer>,
        rule_manager: Arc<RuleManager>,
        capacity: usize,
    ) -> Self {
        assert!(capacity > 0, "priority queue capacity must be positive");
        Self {
            cluster,
            rule_manager,
            capacity,
            queue: Mutex::new(HashMap::new()),
            pause: PauseController::new(),
        }
    }

    fn queue(&self) -> MutexGuard<'_, HashMap<RegionId, PriorityEntry>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.cluster.options().priority_retry_interval_secs())
    }

    /// Fits the region against the placement rules that cover it.
    pub fn fit_region(&self, region: &RegionInfo) -> RegionFit {
        self.rule_manager
            .fit_region(region, |id| self.cluster.get_store(id))
    }

    /// Replicas the region lacks, with or without placement rules.
    fn makeup_count(&self, region: &RegionInfo, fit: &RegionFit) -> usize {
        if self.cluster.options().is_placement_rules_enabled() {
            return fit.makeup_count();
        }
        let healthy = region
            .peers()
            .iter()
            .filter(|p| !region.is_down_peer(p.id))
            .count();
        self.cluster.options().max_replicas().saturating_sub(healthy)
    }

    fn push(&self, region_id: RegionId, priority: usize) {
        let now = Instant::now();
        let mut queue = self.queue();
        queue
            .entry(region_id)
            .and_modify(|entry| {
                entry.priority = priority;
                entry.attempt = entry.attempt.saturating_add(1);
                entry.last = now;
            })
            .or_insert(PriorityEntry {
                region_id,
                priority,
                attempt: 1,
                last: now,
            });

        if queue.len() > self.capacity {
            let lowest = queue
                .values()
                .min_by_key(|e| (e.priority, e.last, e.region_id))
                .map(|e| e.region_id);
            if let Some(evicted) = lowest {
                queue.remove(&evicted);
                tracing::trace!(region = %evicted, "evicted from priority queue");
            }
        }
    }

    /// Queued regions due for a retry, most urgent first.
    ///
    /// Returned regions are not retried again until their next interval
    /// has elapsed.
    pub fn get_priority_regions(&self) -> Vec<RegionId> {
        let now = Instant::now();
        let retry_interval = self.retry_interval();
        let mut queue = self.queue();

        let mut ready: Vec<&mut PriorityEntry> = queue
            .values_mut()
            .filter(|entry| entry.ready_at(retry_interval).is_some_and(|at| at <= now))
            .collect();
        ready.sort_by_key(|entry| (std::cmp::Reverse(entry.priority), entry.region_id));
        ready
            .into_iter()
            .map(|entry| {
                entry.last = now;
                entry.region_id
            })
            .collect()
    }

    pub fn remove_priority_region(&self, region_id: RegionId) -> bool {
        self.queue().remove(&region_id).is_some()
    }

    pub fn priority_entry(&self, region_id: RegionId) -> Option<PriorityEntry> {
        self.queue().get(&region_id).copied()
    }

    /// Number of queued regions, due or not.
    pub fn queue_len(&self) -> usize {
        self.queue().len()
    }
}

impl Checker for PriorityChecker {
    type Output = RegionFit;

    fn kind(&self) -> CheckerKind {
        CheckerKind::Priority
    }

    fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    fn check(&self, region: &RegionInfo) -> Option<RegionFit> {
        if self.is_paused() {
            tracing::trace!(region = %region.id(), "priority checker paused");
            return None;
        }

        let fit = self.fit_region(region);
        let makeup = self.makeup_count(region, &fit);
        if makeup > 0 {
            self.push(region.id(), makeup);
        } else {
            self.remove_priority_region(region.id());
        }
        Some(fit)
    }
}
