//! Replica-count repair used when placement rules are disabled.

use std::sync::Arc;

use cairn_types::{Operator, OperatorKind, OperatorPriority, Peer, RegionInfo, StoreId, StoreInfo};

use crate::checker::{
    Checker, CheckerKind, add_peer_steps, remove_peer_steps, select_target_store,
};
use crate::cluster::ClusterInformer;
use crate::pause::PauseController;
use crate::waiting_list::RegionWaitingList;

/// Keeps every region at `max_replicas` healthy peers.
///
/// Problems are handled one at a time, most urgent first: down peers,
/// peers on draining stores, missing replicas, surplus replicas. A region
/// with no acceptable target store is parked on the waiting list.
pub struct ReplicaChecker {
    cluster: Arc<dyn ClusterInformer>,
    waiting_list: Arc<RegionWaitingList>,
    pause: PauseController,
}

impl ReplicaChecker {
    pub fn new(cluster: Arc<dyn ClusterInformer>, waiting_list: Arc<RegionWaitingList>) -> Self {
        Self {
            cluster,
            waiting_list,
            pause: PauseController::new(),
        }
    }

    /// Adds a replacement for `peer` on a new store, then removes it.
    fn replace_peer(
        &self,
        region: &RegionInfo,
        stores: &[StoreInfo],
        peer: &Peer,
        desc: &'static str,
    ) -> Option<Operator> {
        let Some(target) = self.target_store(region, stores) else {
            self.park(region, desc);
            return None;
        };
        let mut steps = add_peer_steps(self.cluster.as_ref(), target, !peer.is_learner());
        steps.extend(remove_peer_steps(region, peer));
        Some(
            Operator::new(desc, region.id(), OperatorKind::Replica, steps)
                .with_priority(OperatorPriority::High),
        )
    }

    fn target_store(&self, region: &RegionInfo, stores: &[StoreInfo]) -> Option<StoreId> {
        let location_labels = self.cluster.options().location_labels();
        select_target_store(stores, region, &location_labels, |_| true)
    }

    fn park(&self, region: &RegionInfo, desc: &str) {
        tracing::warn!(
            region = %region.id(),
            desc,
            "no target store, region added to waiting list"
        );
        self.waiting_list.put(region.id());
    }
}

impl Checker for ReplicaChecker {
    type Output = Operator;

    fn kind(&self) -> CheckerKind {
        CheckerKind::Replica
    }

    fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    fn check(&self, region: &RegionInfo) -> Option<Operator> {
        if self.is_paused() {
            tracing::trace!(region = %region.id(), "replica checker paused");
            return None;
        }

        let stores = self.cluster.get_stores();
        let store_of = |id: StoreId| stores.iter().find(|s| s.id == id);

        if let Some(down) = region.peers().iter().find(|p| region.is_down_peer(p.id)) {
            return self.replace_peer(region, &stores, down, "replace-down-replica");
        }
        if let Some(offline) = region
            .peers()
            .iter()
            .find(|p| store_of(p.store_id).is_some_and(StoreInfo::is_removing))
        {
            return self.replace_peer(region, &stores, offline, "replace-offline-replica");
        }

        let max_replicas = self.cluster.options().max_replicas();
        let replicas = region.peers().len();
        if replicas < max_replicas {
            let Some(target) = self.target_store(region, &stores) else {
                self.park(region, "make-up-replica");
                return None;
            };
            let steps = add_peer_steps(self.cluster.as_ref(), target, true);
            let op = Operator::new("make-up-replica", region.id(), OperatorKind::Replica, steps)
                .with_priority(OperatorPriority::High);
            tracing::debug!(region = %region.id(), op = %op, "replica checker proposed operator");
            return Some(op);
        }

        if replicas > max_replicas {
            // Drop the replica on the busiest store, sparing the leader.
            let leader = region.leader().map(|p| p.id);
            let victim = region
                .peers()
                .iter()
                .filter(|p| Some(p.id) != leader)
                .max_by_key(|p| (store_of(p.store_id).map_or(0, |s| s.region_count), p.id))?;
            let op = Operator::new(
                "remove-extra-replica",
                region.id(),
                OperatorKind::Replica,
                remove_peer_steps(region, victim),
            );
            tracing::debug!(region = %region.id(), op = %op, "replica checker proposed operator");
            return Some(op);
        }

        None
    }
}
