//! Placement rules and region fitting.
//!
//! A [`Rule`] asks for `count` replicas of a given role on stores matching
//! its label constraints, for every region inside its key range. Fitting a
//! region assigns each of its peers to at most one rule; the result
//! ([`RegionFit`]) tells the rule checker what is missing, misplaced or
//! surplus.
//!
//! Rules are applied in `(index, group_id, id)` order and assignment is
//! greedy: earlier rules pick their preferred peers first.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use cairn_types::{Peer, PeerRole, RegionInfo, StoreId, StoreInfo};
use serde::{Deserialize, Serialize};

use crate::error::{CheckerError, Result};
use crate::keys;

/// Group and ID of the rule installed at startup.
pub const DEFAULT_GROUP_ID: &str = "pd";
pub const DEFAULT_RULE_ID: &str = "default";

// ============================================================================
// Rules
// ============================================================================

/// Role a rule requires of the peers it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleRole {
    /// Voter that may hold leadership.
    Voter,
    /// Voter expected to hold leadership.
    Leader,
    /// Voter that should not hold leadership.
    Follower,
    Learner,
}

impl RuleRole {
    pub fn wants_voter(self) -> bool {
        !matches!(self, RuleRole::Learner)
    }

    fn matches(self, role: PeerRole) -> bool {
        if self.wants_voter() {
            role == PeerRole::Voter
        } else {
            role == PeerRole::Learner
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelConstraintOp {
    In,
    NotIn,
    Exists,
    NotExists,
}

/// Store label predicate, e.g. `zone in [z1, z2]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelConstraint {
    pub key: String,
    pub op: LabelConstraintOp,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelConstraint {
    pub fn new(key: impl Into<String>, op: LabelConstraintOp, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            op,
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    pub fn matches(&self, store: &StoreInfo) -> bool {
        let value = store.label(&self.key);
        match self.op {
            LabelConstraintOp::In => value.is_some_and(|v| self.values.iter().any(|x| x == v)),
            LabelConstraintOp::NotIn => value.is_none_or(|v| !self.values.iter().any(|x| x == v)),
            LabelConstraintOp::Exists => value.is_some(),
            LabelConstraintOp::NotExists => value.is_none(),
        }
    }
}

/// A placement rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub group_id: String,
    pub id: String,
    /// Rules with a lower index are fitted first.
    #[serde(default)]
    pub index: i32,
    #[serde(default)]
    pub start_key: Bytes,
    /// Empty means +infinity.
    #[serde(default)]
    pub end_key: Bytes,
    pub role: RuleRole,
    pub count: usize,
    #[serde(default)]
    pub label_constraints: Vec<LabelConstraint>,
}

impl Rule {
    /// Creates a rule spanning the whole key space.
    pub fn new(
        group_id: impl Into<String>,
        id: impl Into<String>,
        role: RuleRole,
        count: usize,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            id: id.into(),
            index: 0,
            start_key: Bytes::new(),
            end_key: Bytes::new(),
            role,
            count,
            label_constraints: Vec::new(),
        }
    }

    pub fn with_key_range(mut self, start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        self.start_key = start.into();
        self.end_key = end.into();
        self
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.index = index;
        self
    }

    pub fn with_constraint(mut self, constraint: LabelConstraint) -> Self {
        self.label_constraints.push(constraint);
        self
    }

    fn key(&self) -> (String, String) {
        (self.group_id.clone(), self.id.clone())
    }

    /// Returns true if the region lies entirely inside the rule's range.
    pub fn covers(&self, region: &RegionInfo) -> bool {
        keys::range_covers(
            &self.start_key,
            &self.end_key,
            region.start_key(),
            region.end_key(),
        )
    }

    pub fn matches_store(&self, store: &StoreInfo) -> bool {
        self.label_constraints.iter().all(|c| c.matches(store))
    }

    fn validate(&self) -> Result<()> {
        if self.group_id.is_empty() || self.id.is_empty() {
            return Err(CheckerError::InvalidRule(
                "group_id and id must not be empty".to_string(),
            ));
        }
        if self.count == 0 {
            return Err(CheckerError::InvalidRule(format!(
                "rule {}/{} must ask for at least one replica",
                self.group_id, self.id
            )));
        }
        if !self.end_key.is_empty() && self.start_key >= self.end_key {
            return Err(CheckerError::InvalidRule(format!(
                "rule {}/{} has an empty key range",
                self.group_id, self.id
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Fit results
// ============================================================================

/// Peers assigned to one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFit {
    pub rule: Rule,
    pub peers: Vec<Peer>,
    /// Assigned peers that are down.
    pub down_peers: Vec<Peer>,
    /// Assigned peers on stores that are being drained.
    pub removing_peers: Vec<Peer>,
}

impl RuleFit {
    /// Number of replicas the rule still needs.
    pub fn missing(&self) -> usize {
        self.rule.count.saturating_sub(self.peers.len())
    }

    /// Assigned peers whose role differs from the rule's role.
    pub fn misrole_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| !self.rule.role.matches(p.role))
    }

    /// Number of replicas needing attention: missing, down or draining.
    pub fn makeup_count(&self) -> usize {
        self.missing() + self.down_peers.len() + self.removing_peers.len()
    }

    pub fn is_satisfied(&self) -> bool {
        self.makeup_count() == 0 && self.misrole_peers().next().is_none()
    }
}

/// Result of fitting a region against its rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionFit {
    pub rule_fits: Vec<RuleFit>,
    /// Peers no rule selected.
    pub orphan_peers: Vec<Peer>,
}

impl RegionFit {
    pub fn is_satisfied(&self) -> bool {
        self.orphan_peers.is_empty() && self.rule_fits.iter().all(RuleFit::is_satisfied)
    }

    /// Total replicas that need to be created or replaced.
    pub fn makeup_count(&self) -> usize {
        self.rule_fits.iter().map(RuleFit::makeup_count).sum()
    }
}

// ============================================================================
// Rule manager
// ============================================================================

/// Stores placement rules and fits regions against them.
#[derive(Debug)]
pub struct RuleManager {
    rules: RwLock<BTreeMap<(String, String), Rule>>,
}

impl RuleManager {
    /// Creates a manager holding only the default rule (`max_replicas` voters).
    pub fn new(max_replicas: usize) -> Self {
        let default_rule = Rule::new(
            DEFAULT_GROUP_ID,
            DEFAULT_RULE_ID,
            RuleRole::Voter,
            max_replicas.max(1),
        );
        let mut rules = BTreeMap::new();
        rules.insert(default_rule.key(), default_rule);
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Creates a manager with no rules at all.
    pub fn empty() -> Self {
        Self {
            rules: RwLock::new(BTreeMap::new()),
        }
    }

    /// Inserts or replaces a rule.
    pub fn set_rule(&self, rule: Rule) -> Result<()> {
        rule.validate()?;
        tracing::info!(
            group = %rule.group_id,
            id = %rule.id,
            count = rule.count,
            "placement rule set"
        );
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule.key(), rule);
        Ok(())
    }

    pub fn delete_rule(&self, group_id: &str, id: &str) -> Option<Rule> {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(group_id.to_string(), id.to_string()))
    }

    pub fn get_rule(&self, group_id: &str, id: &str) -> Option<Rule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(group_id.to_string(), id.to_string()))
            .cloned()
    }

    pub fn get_rules(&self) -> Vec<Rule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Rules covering the region, in fitting order.
    pub fn get_rules_for_region(&self, region: &RegionInfo) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|rule| rule.covers(region))
            .cloned()
            .collect();
        rules.sort_by(|a, b| {
            (a.index, &a.group_id, &a.id).cmp(&(b.index, &b.group_id, &b.id))
        });
        rules
    }

    /// Rule boundaries strictly inside `[start, end)`, sorted and unique.
    pub fn get_split_keys(&self, start: &[u8], end: &[u8]) -> Vec<Bytes> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        let mut split_keys: Vec<Bytes> = rules
            .values()
            .flat_map(|rule| [&rule.start_key, &rule.end_key])
            .filter(|key| keys::is_strictly_inside(key, start, end))
            .cloned()
            .collect();
        split_keys.sort();
        split_keys.dedup();
        split_keys
    }

    /// Fits the region's peers against the rules that cover it.
    ///
    /// `store` resolves a store ID; peers on unknown stores are never
    /// selected and end up as orphans.
    pub fn fit_region(
        &self,
        region: &RegionInfo,
        store: impl Fn(StoreId) -> Option<StoreInfo>,
    ) -> RegionFit {
        let rules = self.get_rules_for_region(region);
        let mut available: Vec<(Peer, Option<StoreInfo>)> = region
            .peers()
            .iter()
            .map(|peer| (*peer, store(peer.store_id)))
            .collect();

        let mut rule_fits = Vec::with_capacity(rules.len());
        for rule in rules {
            // Healthy peers with the right role first, then anything the
            // rule can still use.
            let mut candidates: Vec<usize> = available
                .iter()
                .enumerate()
                .filter(|(_, (_, store))| store.as_ref().is_some_and(|s| rule.matches_store(s)))
                .map(|(i, _)| i)
                .collect();
            candidates.sort_by_key(|&i| {
                let (peer, store) = &available[i];
                let unhealthy = region.is_down_peer(peer.id)
                    || store.as_ref().is_some_and(StoreInfo::is_removing);
                (unhealthy, !rule.role.matches(peer.role), peer.id)
            });
            candidates.truncate(rule.count);
            candidates.sort_unstable_by(|a, b| b.cmp(a));

            let mut fit = RuleFit {
                rule,
                peers: Vec::new(),
                down_peers: Vec::new(),
                removing_peers: Vec::new(),
            };
            for index in candidates {
                let (peer, store) = available.swap_remove(index);
                if region.is_down_peer(peer.id) {
                    fit.down_peers.push(peer);
                } else if store.as_ref().is_some_and(StoreInfo::is_removing) {
                    fit.removing_peers.push(peer);
                }
                fit.peers.push(peer);
            }
            fit.peers.sort_by_key(|p| p.id);
            rule_fits.push(fit);
        }

        let mut orphan_peers: Vec<Peer> = available.into_iter().map(|(peer, _)| peer).collect();
        orphan_peers.sort_by_key(|p| p.id);

        RegionFit {
            rule_fits,
            orphan_peers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::{PeerId, RegionId, StoreState};
    use std::collections::HashMap;

    fn stores(specs: &[(u64, &str)]) -> HashMap<StoreId, StoreInfo> {
        specs
            .iter()
            .map(|&(id, zone)| {
                let store = StoreInfo::new(id).with_label("zone", zone);
                (store.id, store)
            })
            .collect()
    }

    fn fit(
        manager: &RuleManager,
        region: &RegionInfo,
        stores: &HashMap<StoreId, StoreInfo>,
    ) -> RegionFit {
        manager.fit_region(region, |id| stores.get(&id).cloned())
    }

    #[test]
    fn default_rule_is_satisfied_by_three_voters() {
        let manager = RuleManager::new(3);
        let stores = stores(&[(1, "z1"), (2, "z2"), (3, "z3")]);
        let region = RegionInfo::new(
            RegionId::new(1),
            "",
            "",
            vec![Peer::voter(11, 1), Peer::voter(12, 2), Peer::voter(13, 3)],
        );

        let fit = fit(&manager, &region, &stores);
        assert!(fit.is_satisfied());
        assert_eq!(fit.makeup_count(), 0);
    }

    #[test]
    fn missing_replica_is_counted() {
        let manager = RuleManager::new(3);
        let stores = stores(&[(1, "z1"), (2, "z2")]);
        let region = RegionInfo::new(
            RegionId::new(1),
            "",
            "",
            vec![Peer::voter(11, 1), Peer::voter(12, 2)],
        );

        let fit = fit(&manager, &region, &stores);
        assert!(!fit.is_satisfied());
        assert_eq!(fit.rule_fits[0].missing(), 1);
        assert_eq!(fit.makeup_count(), 1);
    }

    #[test]
    fn surplus_peer_becomes_orphan() {
        let manager = RuleManager::new(2);
        let stores = stores(&[(1, "z1"), (2, "z2"), (3, "z3")]);
        let region = RegionInfo::new(
            RegionId::new(1),
            "",
            "",
            vec![Peer::voter(11, 1), Peer::voter(12, 2), Peer::voter(13, 3)],
        );

        let fit = fit(&manager, &region, &stores);
        assert_eq!(fit.orphan_peers.len(), 1);
        assert!(!fit.is_satisfied());
    }

    #[test]
    fn down_peer_is_selected_last_and_reported() {
        let manager = RuleManager::new(3);
        let stores = stores(&[(1, "z1"), (2, "z2"), (3, "z3")]);
        let region = RegionInfo::new(
            RegionId::new(1),
            "",
            "",
            vec![Peer::voter(11, 1), Peer::voter(12, 2), Peer::voter(13, 3)],
        )
        .with_down_peers(vec![PeerId::new(12)]);

        let fit = fit(&manager, &region, &stores);
        assert_eq!(fit.rule_fits[0].down_peers.len(), 1);
        assert_eq!(fit.rule_fits[0].down_peers[0].id, PeerId::new(12));
        assert_eq!(fit.makeup_count(), 1);
    }

    #[test]
    fn learner_under_voter_rule_is_misrole() {
        let manager = RuleManager::new(3);
        let stores = stores(&[(1, "z1"), (2, "z2"), (3, "z3")]);
        let region = RegionInfo::new(
            RegionId::new(1),
            "",
            "",
            vec![Peer::voter(11, 1), Peer::voter(12, 2), Peer::learner(13, 3)],
        );

        let fit = fit(&manager, &region, &stores);
        let misrole: Vec<_> = fit.rule_fits[0].misrole_peers().collect();
        assert_eq!(misrole.len(), 1);
        assert_eq!(misrole[0].id, PeerId::new(13));
        assert_eq!(fit.makeup_count(), 0);
        assert!(!fit.is_satisfied());
    }

    #[test]
    fn label_constraints_restrict_selection() {
        let manager = RuleManager::empty();
        manager
            .set_rule(Rule::new("app", "voters", RuleRole::Voter, 2).with_constraint(
                LabelConstraint::new("zone", LabelConstraintOp::In, &["z1", "z2"]),
            ))
            .unwrap();
        manager
            .set_rule(Rule::new("app", "witness", RuleRole::Learner, 1).with_index(1))
            .unwrap();

        let stores = stores(&[(1, "z1"), (2, "z3"), (3, "z2")]);
        let region = RegionInfo::new(
            RegionId::new(1),
            "",
            "",
            vec![Peer::voter(11, 1), Peer::voter(12, 2), Peer::voter(13, 3)],
        );

        let fit = fit(&manager, &region, &stores);
        let voter_stores: Vec<_> = fit.rule_fits[0].peers.iter().map(|p| p.store_id).collect();
        assert_eq!(voter_stores, vec![StoreId::new(1), StoreId::new(3)]);
        // The store in z3 lands in the learner rule with the wrong role.
        assert_eq!(fit.rule_fits[1].peers[0].store_id, StoreId::new(2));
        assert_eq!(fit.rule_fits[1].misrole_peers().count(), 1);
    }

    #[test]
    fn removing_store_is_reported() {
        let manager = RuleManager::new(1);
        let mut stores = stores(&[(1, "z1")]);
        stores.insert(
            StoreId::new(1),
            StoreInfo::new(1).with_state(StoreState::Offline),
        );
        let region = RegionInfo::new(RegionId::new(1), "", "", vec![Peer::voter(11, 1)]);

        let fit = fit(&manager, &region, &stores);
        assert_eq!(fit.rule_fits[0].removing_peers.len(), 1);
    }

    #[test]
    fn rules_only_apply_inside_their_range() {
        let manager = RuleManager::new(3);
        manager
            .set_rule(Rule::new("app", "hot", RuleRole::Voter, 5).with_key_range("m", "t"))
            .unwrap();

        let inside = RegionInfo::new(RegionId::new(1), "n", "p", vec![]);
        let straddling = RegionInfo::new(RegionId::new(2), "k", "p", vec![]);

        assert_eq!(manager.get_rules_for_region(&inside).len(), 2);
        assert_eq!(manager.get_rules_for_region(&straddling).len(), 1);
    }

    #[test]
    fn split_keys_come_from_rule_boundaries() {
        let manager = RuleManager::new(3);
        manager
            .set_rule(Rule::new("app", "hot", RuleRole::Voter, 5).with_key_range("m", "t"))
            .unwrap();

        let keys = manager.get_split_keys(b"a", b"");
        assert_eq!(keys, vec![Bytes::from_static(b"m"), Bytes::from_static(b"t")]);
        assert!(manager.get_split_keys(b"m", b"t").is_empty());
        assert_eq!(manager.get_split_keys(b"n", b"z"), vec![Bytes::from_static(b"t")]);
    }

    #[test]
    fn invalid_rules_are_rejected() {
        let manager = RuleManager::empty();
        assert!(matches!(
            manager.set_rule(Rule::new("app", "none", RuleRole::Voter, 0)),
            Err(CheckerError::InvalidRule(_))
        ));
        assert!(
            manager
                .set_rule(Rule::new("app", "bad", RuleRole::Voter, 1).with_key_range("z", "a"))
                .is_err()
        );
        assert!(manager.get_rules().is_empty());
    }

    #[test]
    fn delete_rule_removes_it() {
        let manager = RuleManager::new(3);
        assert!(manager.get_rule(DEFAULT_GROUP_ID, DEFAULT_RULE_ID).is_some());
        assert!(manager.delete_rule(DEFAULT_GROUP_ID, DEFAULT_RULE_ID).is_some());
        assert!(manager.get_rules().is_empty());
    }

    #[test]
    fn rule_round_trips_through_json() {
        let json = r#"{"group_id":"app","id":"r1","role":"learner","count":1}"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.role, RuleRole::Learner);
        assert!(rule.start_key.is_empty());
    }
}
