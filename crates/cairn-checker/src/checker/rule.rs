//! Placement-rule-driven replica repair.

use std::sync::Arc;

use cairn_types::{
    Operator, OperatorKind, OperatorPriority, OperatorStep, Peer, PeerRole, RegionInfo, StoreId,
    StoreInfo,
};

use crate::checker::{
    Checker, CheckerKind, add_peer_steps, remove_peer_steps, select_target_store,
};
use crate::cluster::ClusterInformer;
use crate::pause::PauseController;
use crate::placement::{RegionFit, Rule, RuleFit, RuleManager};
use crate::waiting_list::RegionWaitingList;

/// Repairs a region until every rule covering it is satisfied.
///
/// One problem is fixed per check, in this order: missing replicas, down
/// replicas, replicas on draining stores, replicas with the wrong role,
/// replicas no rule wants.
pub struct RuleChecker {
    cluster: Arc<dyn ClusterInformer>,
    rule_manager: Arc<RuleManager>,
    waiting_list: Arc<RegionWaitingList>,
    pause: PauseController,
}

impl RuleChecker {
    pub fn new(
        cluster: Arc<dyn ClusterInformer>,
        rule_manager: Arc<RuleManager>,
        waiting_list: Arc<RegionWaitingList>,
    ) -> Self {
        Self {
            cluster,
            rule_manager,
            waiting_list,
            pause: PauseController::new(),
        }
    }

    /// Proposes a repair for the region using an already computed fit.
    pub fn check_with_fit(&self, region: &RegionInfo, fit: &RegionFit) -> Option<Operator> {
        if self.is_paused() {
            tracing::trace!(region = %region.id(), "rule checker paused");
            return None;
        }

        let stores = self.cluster.get_stores();
        let op = if let Some(rule_fit) = fit.rule_fits.iter().find(|f| f.missing() > 0) {
            self.add_rule_peer(region, &stores, &rule_fit.rule)?
        } else if let Some((rule_fit, peer)) = first_peer(fit, |f| &f.down_peers) {
            self.replace_rule_peer(region, &stores, rule_fit, peer, "replace-rule-down-peer")?
        } else if let Some((rule_fit, peer)) = first_peer(fit, |f| &f.removing_peers) {
            self.replace_rule_peer(region, &stores, rule_fit, peer, "replace-rule-offline-peer")?
        } else if let Some(op) = self.fix_peer_role(region, fit) {
            op
        } else if let Some(orphan) = fit.orphan_peers.first() {
            Operator::new(
                "remove-orphan-peer",
                region.id(),
                OperatorKind::Replica,
                remove_peer_steps(region, orphan),
            )
        } else {
            return None;
        };

        tracing::debug!(region = %region.id(), op = %op, "rule checker proposed operator");
        Some(op)
    }

    fn target_store(
        &self,
        region: &RegionInfo,
        stores: &[StoreInfo],
        rule: &Rule,
    ) -> Option<StoreId> {
        let location_labels = self.cluster.options().location_labels();
        select_target_store(stores, region, &location_labels, |s| rule.matches_store(s))
    }

    fn park(&self, region: &RegionInfo, rule: &Rule) {
        tracing::warn!(
            region = %region.id(),
            group = %rule.group_id,
            rule = %rule.id,
            "no store satisfies rule, region added to waiting list"
        );
        self.waiting_list.put(region.id());
    }

    fn add_rule_peer(
        &self,
        region: &RegionInfo,
        stores: &[StoreInfo],
        rule: &Rule,
    ) -> Option<Operator> {
        let Some(target) = self.target_store(region, stores, rule) else {
            self.park(region, rule);
            return None;
        };
        let steps = add_peer_steps(self.cluster.as_ref(), target, rule.role.wants_voter());
        Some(
            Operator::new("add-rule-peer", region.id(), OperatorKind::Replica, steps)
                .with_priority(OperatorPriority::High),
        )
    }

    fn replace_rule_peer(
        &self,
        region: &RegionInfo,
        stores: &[StoreInfo],
        rule_fit: &RuleFit,
        peer: &Peer,
        desc: &'static str,
    ) -> Option<Operator> {
        let Some(target) = self.target_store(region, stores, &rule_fit.rule) else {
            self.park(region, &rule_fit.rule);
            return None;
        };
        let mut steps =
            add_peer_steps(self.cluster.as_ref(), target, rule_fit.rule.role.wants_voter());
        steps.extend(remove_peer_steps(region, peer));
        Some(
            Operator::new(desc, region.id(), OperatorKind::Replica, steps)
                .with_priority(OperatorPriority::High),
        )
    }

    fn fix_peer_role(&self, region: &RegionInfo, fit: &RegionFit) -> Option<Operator> {
        for rule_fit in &fit.rule_fits {
            let wants_voter = rule_fit.rule.role.wants_voter();
            for peer in rule_fit.misrole_peers() {
                let steps = match peer.role {
                    PeerRole::Learner if wants_voter => vec![OperatorStep::PromoteLearner {
                        store_id: peer.store_id,
                        peer_id: peer.id,
                    }],
                    PeerRole::Voter if !wants_voter => {
                        let mut steps = remove_peer_steps(region, peer);
                        // Keep the leader transfer, swap the removal for a demotion.
                        steps.pop();
                        steps.push(OperatorStep::DemoteVoter {
                            store_id: peer.store_id,
                            peer_id: peer.id,
                        });
                        steps
                    }
                    _ => continue,
                };
                return Some(Operator::new(
                    "fix-peer-role",
                    region.id(),
                    OperatorKind::Region,
                    steps,
                ));
            }
        }
        None
    }
}

fn first_peer<'a>(
    fit: &'a RegionFit,
    peers: impl Fn(&'a RuleFit) -> &'a Vec<Peer>,
) -> Option<(&'a RuleFit, &'a Peer)> {
    fit.rule_fits
        .iter()
        .find_map(|rule_fit| peers(rule_fit).first().map(|peer| (rule_fit, peer)))
}

impl Checker for RuleChecker {
    type Output = Operator;

    fn kind(&self) -> CheckerKind {
        CheckerKind::Rule
    }

    fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    /// Fits the region itself, then repairs it.
    fn check(&self, region: &RegionInfo) -> Option<Operator> {
        let fit = self
            .rule_manager
            .fit_region(region, |id| self.cluster.get_store(id));
        self.check_with_fit(region, &fit)
    }
}
