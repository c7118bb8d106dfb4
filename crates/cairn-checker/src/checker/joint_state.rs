//! Finishes raft joint-configuration transitions.

use std::sync::Arc;

use cairn_types::{Operator, OperatorKind, OperatorPriority, OperatorStep, PeerRole, RegionInfo};

use crate::checker::{Checker, CheckerKind};
use crate::cluster::ClusterInformer;
use crate::pause::PauseController;

/// Proposes leaving the joint state for any region that is in one.
///
/// Nothing else may touch a region mid-transition, so this checker always
/// runs first.
pub struct JointStateChecker {
    cluster: Arc<dyn ClusterInformer>,
    pause: PauseController,
}

impl JointStateChecker {
    pub fn new(cluster: Arc<dyn ClusterInformer>) -> Self {
        Self {
            cluster,
            pause: PauseController::new(),
        }
    }
}

impl Checker for JointStateChecker {
    type Output = Operator;

    fn kind(&self) -> CheckerKind {
        CheckerKind::JointState
    }

    fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    fn check(&self, region: &RegionInfo) -> Option<Operator> {
        if self.is_paused() {
            tracing::trace!(region = %region.id(), "joint-state checker paused");
            return None;
        }
        if !region.is_in_joint_state() {
            return None;
        }

        let mut steps = Vec::with_capacity(2);
        // A demoting leader would become a learner; hand leadership to a
        // peer that stays a voter first.
        if let Some(leader) = region.leader() {
            if leader.role == PeerRole::DemotingVoter {
                let target = region
                    .peers()
                    .iter()
                    .filter(|p| matches!(p.role, PeerRole::Voter | PeerRole::IncomingVoter))
                    .find(|p| !region.is_down_peer(p.id) && !region.is_pending_peer(p.id))
                    .filter(|p| {
                        self.cluster
                            .get_store(p.store_id)
                            .is_some_and(|store| store.is_up())
                    });
                match target {
                    Some(target) => steps.push(OperatorStep::TransferLeader {
                        from: leader.store_id,
                        to: target.store_id,
                    }),
                    None => {
                        tracing::warn!(
                            region = %region.id(),
                            "no leader target to leave joint state"
                        );
                        return None;
                    }
                }
            }
        }
        steps.push(OperatorStep::LeaveJointState);

        let op = Operator::new("leave-joint-state", region.id(), OperatorKind::Admin, steps)
            .with_priority(OperatorPriority::High);
        tracing::debug!(region = %region.id(), op = %op, "joint-state checker proposed operator");
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_config::CairnConfig;
    use cairn_types::{Peer, PeerId, RegionId, StoreId, StoreInfo};

    use crate::cluster::InMemoryCluster;

    fn checker() -> JointStateChecker {
        let cluster = InMemoryCluster::new(CairnConfig::default());
        for id in 1..=4 {
            cluster.put_store(StoreInfo::new(id));
        }
        JointStateChecker::new(Arc::new(cluster))
    }

    fn joint_peers() -> Vec<Peer> {
        vec![
            Peer::voter(11, 1),
            Peer::voter(12, 2),
            Peer::new(PeerId::new(13), StoreId::new(3), PeerRole::DemotingVoter),
            Peer::new(PeerId::new(14), StoreId::new(4), PeerRole::IncomingVoter),
        ]
    }

    #[test]
    fn stable_region_is_ignored() {
        let region = RegionInfo::new(
            RegionId::new(1),
            "",
            "",
            vec![Peer::voter(11, 1), Peer::voter(12, 2), Peer::voter(13, 3)],
        );
        assert!(checker().check(&region).is_none());
    }

    #[test]
    fn joint_region_leaves_joint_state() {
        let region = RegionInfo::new(RegionId::new(1), "", "", joint_peers());
        let op = checker().check(&region).unwrap();

        assert_eq!(op.desc(), "leave-joint-state");
        assert_eq!(op.kind(), OperatorKind::Admin);
        assert_eq!(op.priority(), OperatorPriority::High);
        assert_eq!(op.steps(), &[OperatorStep::LeaveJointState]);
    }

    #[test]
    fn demoting_leader_transfers_first() {
        let region =
            RegionInfo::new(RegionId::new(1), "", "", joint_peers()).with_leader(PeerId::new(13));
        let op = checker().check(&region).unwrap();

        assert_eq!(
            op.steps()[0],
            OperatorStep::TransferLeader {
                from: StoreId::new(3),
                to: StoreId::new(1),
            }
        );
        assert_eq!(op.steps()[1], OperatorStep::LeaveJointState);
    }

    #[test]
    fn paused_checker_declines() {
        let checker = checker();
        checker.pause_controller().pause_or_resume(60);
        let region = RegionInfo::new(RegionId::new(1), "", "", joint_peers());
        assert!(checker.check(&region).is_none());
    }
}
