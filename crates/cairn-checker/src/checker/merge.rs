//! Merges small regions into an adjacent neighbour.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cairn_types::{Operator, OperatorKind, OperatorStep, RegionId, RegionInfo, StoreId};

use crate::checker::{Checker, CheckerKind};
use crate::cluster::ClusterInformer;
use crate::pause::PauseController;

/// The two halves of a merge. Scheduling only one of them is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOperators {
    /// Runs on the region being merged away.
    pub source: Operator,
    /// Runs on the surviving region and waits for the source.
    pub target: Operator,
}

impl MergeOperators {
    pub fn into_vec(self) -> Vec<Operator> {
        vec![self.source, self.target]
    }
}

pub struct MergeChecker {
    cluster: Arc<dyn ClusterInformer>,
    /// Regions produced by a recent split, with the time it happened.
    split_cache: Mutex<HashMap<RegionId, Instant>>,
    pause: PauseController,
}

impl MergeChecker {
    pub fn new(cluster: Arc<dyn ClusterInformer>) -> Self {
        Self {
            cluster,
            split_cache: Mutex::new(HashMap::new()),
            pause: PauseController::new(),
        }
    }

    /// Marks regions as freshly split so they are not merged straight back.
    ///
    /// Only regions recorded here are held back for
    /// `split_merge_interval_secs`. Embedders reach this through
    /// [`CheckerController::record_region_split`](crate::CheckerController::record_region_split)
    /// when a split is applied.
    pub fn record_region_split(&self, region_ids: &[RegionId]) {
        let now = Instant::now();
        let mut cache = self.split_cache.lock().unwrap_or_else(PoisonError::into_inner);
        for id in region_ids {
            cache.insert(*id, now);
        }
    }

    fn recently_split(&self, region_id: RegionId) -> bool {
        let interval = Duration::from_secs(self.cluster.options().split_merge_interval_secs());
        let mut cache = self.split_cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, at| at.elapsed() < interval);
        cache.contains_key(&region_id)
    }

    fn is_small(&self, region: &RegionInfo) -> bool {
        let options = self.cluster.options();
        region.approximate_size() <= options.max_merge_region_size()
            && region.approximate_keys() <= options.max_merge_region_keys()
    }

    /// A neighbour can absorb `region` only when both are stable and
    /// replicated on the same stores.
    fn can_merge_into(&self, region: &RegionInfo, target: &RegionInfo) -> bool {
        target.is_healthy()
            && !target.is_in_joint_state()
            && target.leader().is_some()
            && !self.recently_split(target.id())
            && sorted_stores(region) == sorted_stores(target)
    }
}

fn sorted_stores(region: &RegionInfo) -> Vec<StoreId> {
    let mut stores: Vec<StoreId> = region.store_ids().collect();
    stores.sort_unstable();
    stores
}

impl Checker for MergeChecker {
    type Output = MergeOperators;

    fn kind(&self) -> CheckerKind {
        CheckerKind::Merge
    }

    fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    fn check(&self, region: &RegionInfo) -> Option<MergeOperators> {
        if self.is_paused() {
            tracing::trace!(region = %region.id(), "merge checker paused");
            return None;
        }
        if !region.is_healthy() || region.is_in_joint_state() || region.leader().is_none() {
            return None;
        }
        if !self.is_small(region) || self.recently_split(region.id()) {
            return None;
        }

        let (prev, next) = self.cluster.get_adjacent_regions(region);
        let prev = prev.filter(|r| self.can_merge_into(region, r));
        let next = next.filter(|r| self.can_merge_into(region, r));
        let target = match (prev, next) {
            (Some(p), Some(n)) if n.approximate_size() < p.approximate_size() => n,
            (Some(p), _) => p,
            (None, Some(n)) => n,
            (None, None) => return None,
        };

        let (source_id, target_id) = (region.id(), target.id());
        let step = |is_passive| OperatorStep::MergeRegion {
            source: source_id,
            target: target_id,
            is_passive,
        };
        let merge_op = |region_id, is_passive| {
            Operator::new("merge-region", region_id, OperatorKind::Merge, vec![step(is_passive)])
        };
        let ops = MergeOperators {
            source: merge_op(source_id, false),
            target: merge_op(target_id, true),
        };
        tracing::debug!(
            source = %source_id,
            target = %target_id,
            "merge checker proposed operators"
        );
        Some(ops)
    }
}
