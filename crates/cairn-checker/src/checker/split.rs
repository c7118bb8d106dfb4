//! Splits regions that straddle a rule or label boundary.

use std::sync::Arc;

use bytes::Bytes;
use cairn_types::{Operator, OperatorKind, OperatorStep, RegionInfo};

use crate::checker::{Checker, CheckerKind};
use crate::cluster::ClusterInformer;
use crate::labeler::RegionLabeler;
use crate::pause::PauseController;
use crate::placement::RuleManager;

pub struct SplitChecker {
    cluster: Arc<dyn ClusterInformer>,
    rule_manager: Arc<RuleManager>,
    labeler: Arc<RegionLabeler>,
    pause: PauseController,
}

impl SplitChecker {
    pub fn new(
        cluster: Arc<dyn ClusterInformer>,
        rule_manager: Arc<RuleManager>,
        labeler: Arc<RegionLabeler>,
    ) -> Self {
        Self {
            cluster,
            rule_manager,
            labeler,
            pause: PauseController::new(),
        }
    }
}

impl Checker for SplitChecker {
    type Output = Operator;

    fn kind(&self) -> CheckerKind {
        CheckerKind::Split
    }

    fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    fn check(&self, region: &RegionInfo) -> Option<Operator> {
        if self.is_paused() {
            tracing::trace!(region = %region.id(), "split checker paused");
            return None;
        }

        let (start, end) = (region.start_key(), region.end_key());
        let mut desc = "labeler-split-region";
        let mut keys: Vec<Bytes> = Vec::new();
        if self.cluster.options().is_placement_rules_enabled() {
            keys = self.rule_manager.get_split_keys(start, end);
            if !keys.is_empty() {
                desc = "rule-split-region";
            }
        }
        keys.extend(self.labeler.get_split_keys(start, end));
        if keys.is_empty() {
            return None;
        }
        keys.sort();
        keys.dedup();

        let op = Operator::new(
            desc,
            region.id(),
            OperatorKind::Split,
            vec![OperatorStep::SplitRegion { keys }],
        );
        tracing::debug!(region = %region.id(), op = %op, "split checker proposed operator");
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_config::CairnConfig;
    use cairn_types::{Peer, RegionId};

    use crate::cluster::InMemoryCluster;
    use crate::labeler::{KeyRange, LabelRule, RegionLabel};
    use crate::placement::{Rule, RuleRole};

    fn setup(config: CairnConfig) -> (SplitChecker, Arc<RuleManager>, Arc<RegionLabeler>) {
        let cluster = Arc::new(InMemoryCluster::new(config));
        let rules = Arc::new(RuleManager::new(3));
        let labeler = Arc::new(RegionLabeler::new());
        let checker = SplitChecker::new(cluster, Arc::clone(&rules), Arc::clone(&labeler));
        (checker, rules, labeler)
    }

    fn region() -> RegionInfo {
        RegionInfo::new(RegionId::new(1), "a", "z", vec![Peer::voter(11, 1)])
    }

    fn split_keys(op: &Operator) -> &[Bytes] {
        match &op.steps()[0] {
            OperatorStep::SplitRegion { keys } => keys,
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn region_inside_all_boundaries_is_left_alone() {
        let (checker, _, _) = setup(CairnConfig::default());
        assert!(checker.check(&region()).is_none());
    }

    #[test]
    fn rule_boundary_splits_region() {
        let (checker, rules, _) = setup(CairnConfig::default());
        rules
            .set_rule(Rule::new("pd", "meta", RuleRole::Voter, 5).with_key_range("m", "q"))
            .unwrap();

        let op = checker.check(&region()).unwrap();
        assert_eq!(op.desc(), "rule-split-region");
        assert_eq!(op.kind(), OperatorKind::Split);
        assert_eq!(
            split_keys(&op),
            &[Bytes::from_static(b"m"), Bytes::from_static(b"q")]
        );
    }

    #[test]
    fn rule_boundaries_ignored_without_placement_rules() {
        let (checker, rules, labeler) = setup(CairnConfig::legacy());
        rules
            .set_rule(Rule::new("pd", "meta", RuleRole::Voter, 5).with_key_range("m", "q"))
            .unwrap();
        assert!(checker.check(&region()).is_none());

        labeler
            .set_label_rule(LabelRule {
                id: "t1".to_string(),
                labels: vec![RegionLabel::new("table", "t1")],
                ranges: vec![KeyRange::new("c", "q")],
            })
            .unwrap();
        let op = checker.check(&region()).unwrap();
        assert_eq!(op.desc(), "labeler-split-region");
        assert_eq!(
            split_keys(&op),
            &[Bytes::from_static(b"c"), Bytes::from_static(b"q")]
        );
    }

    #[test]
    fn shared_boundaries_are_deduplicated() {
        let (checker, rules, labeler) = setup(CairnConfig::default());
        rules
            .set_rule(Rule::new("pd", "meta", RuleRole::Voter, 5).with_key_range("m", "q"))
            .unwrap();
        labeler
            .set_label_rule(LabelRule {
                id: "t1".to_string(),
                labels: vec![],
                ranges: vec![KeyRange::new("m", "")],
            })
            .unwrap();

        let op = checker.check(&region()).unwrap();
        assert_eq!(
            split_keys(&op),
            &[Bytes::from_static(b"m"), Bytes::from_static(b"q")]
        );
    }
}
