//! The seven region checkers and their shared contract.
//!
//! Each checker examines one region snapshot and either proposes a repair
//! or declines. Every checker owns a [`PauseController`]; a paused checker
//! declines everything. The set is closed: the controller holds exactly
//! one instance of each kind and the order it consults them in is fixed.

use std::fmt::Display;
use std::str::FromStr;

use cairn_types::{OperatorStep, Peer, PeerId, RegionInfo, StoreId, StoreInfo};

use crate::cluster::ClusterInformer;
use crate::error::CheckerError;
use crate::pause::PauseController;

mod joint_state;
mod learner;
mod merge;
mod priority;
mod replica;
mod rule;
mod split;

pub use joint_state::JointStateChecker;
pub use learner::LearnerChecker;
pub use merge::{MergeChecker, MergeOperators};
pub use priority::{PriorityChecker, PriorityEntry};
pub use replica::ReplicaChecker;
pub use rule::RuleChecker;
pub use split::SplitChecker;

// ============================================================================
// Checker kinds
// ============================================================================

/// Identifies one of the seven checkers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckerKind {
    Learner,
    Replica,
    Rule,
    Split,
    Merge,
    JointState,
    Priority,
}

impl CheckerKind {
    pub const ALL: [CheckerKind; 7] = [
        CheckerKind::Learner,
        CheckerKind::Replica,
        CheckerKind::Rule,
        CheckerKind::Split,
        CheckerKind::Merge,
        CheckerKind::JointState,
        CheckerKind::Priority,
    ];

    /// Name used for pause-control lookup.
    pub fn name(self) -> &'static str {
        match self {
            CheckerKind::Learner => "learner",
            CheckerKind::Replica => "replica",
            CheckerKind::Rule => "rule",
            CheckerKind::Split => "split",
            CheckerKind::Merge => "merge",
            CheckerKind::JointState => "joint-state",
            CheckerKind::Priority => "priority",
        }
    }

    /// Label used in metrics.
    pub fn type_label(self) -> &'static str {
        match self {
            CheckerKind::Learner => "learner-checker",
            CheckerKind::Replica => "replica-checker",
            CheckerKind::Rule => "rule-checker",
            CheckerKind::Split => "split-checker",
            CheckerKind::Merge => "merge-checker",
            CheckerKind::JointState => "joint-state-checker",
            CheckerKind::Priority => "priority-checker",
        }
    }
}

impl Display for CheckerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CheckerKind {
    type Err = CheckerError;

    /// Exact match on [`CheckerKind::name`]; anything else is `CheckerNotFound`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        CheckerKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| CheckerError::CheckerNotFound(name.to_string()))
    }
}

// ============================================================================
// Checker contract
// ============================================================================

/// A region repair policy.
///
/// `Output` is what the policy produces for a region that needs attention.
/// Most checkers produce a single [`Operator`](cairn_types::Operator). The
/// merge checker produces a [`MergeOperators`] pair and the priority checker
/// produces a placement fit.
pub trait Checker: Send + Sync {
    type Output;

    fn kind(&self) -> CheckerKind;

    fn pause_controller(&self) -> &PauseController;

    /// Examines the region. `None` means "nothing to do" or "paused".
    fn check(&self, region: &RegionInfo) -> Option<Self::Output>;

    fn is_paused(&self) -> bool {
        self.pause_controller().is_paused()
    }
}

// ============================================================================
// Target store selection
// ============================================================================

/// Picks the best store to host a new replica of `region`.
///
/// Candidates must be up, must not already host a peer of the region and
/// must pass `accept`. Among them the store sharing the fewest location
/// labels with the region's other stores wins, then the one with fewer
/// regions, then the lower ID.
pub(crate) fn select_target_store(
    stores: &[StoreInfo],
    region: &RegionInfo,
    location_labels: &[String],
    accept: impl Fn(&StoreInfo) -> bool,
) -> Option<StoreId> {
    let region_stores: Vec<&StoreInfo> = region
        .store_ids()
        .filter_map(|id| stores.iter().find(|s| s.id == id))
        .collect();

    stores
        .iter()
        .filter(|s| s.is_up() && region.peer_on_store(s.id).is_none() && accept(s))
        .min_by_key(|s| {
            (
                location_overlap(s, &region_stores, location_labels),
                s.region_count,
                s.id,
            )
        })
        .map(|s| s.id)
}

/// Steps adding a fresh peer on `store_id`, promoted to voter if `as_voter`.
pub(crate) fn add_peer_steps(
    cluster: &dyn ClusterInformer,
    store_id: StoreId,
    as_voter: bool,
) -> Vec<OperatorStep> {
    let peer_id = PeerId::new(cluster.alloc_id());
    let mut steps = vec![OperatorStep::AddLearner { store_id, peer_id }];
    if as_voter {
        steps.push(OperatorStep::PromoteLearner { store_id, peer_id });
    }
    steps
}

/// Steps removing `peer`, moving leadership away first if it leads.
pub(crate) fn remove_peer_steps(region: &RegionInfo, peer: &Peer) -> Vec<OperatorStep> {
    let mut steps = Vec::with_capacity(2);
    if region.leader().is_some_and(|leader| leader.id == peer.id) {
        if let Some(target) = region.voters().find(|p| {
            p.id != peer.id && !region.is_down_peer(p.id) && !region.is_pending_peer(p.id)
        }) {
            steps.push(OperatorStep::TransferLeader {
                from: peer.store_id,
                to: target.store_id,
            });
        }
    }
    steps.push(OperatorStep::RemovePeer {
        store_id: peer.store_id,
        peer_id: peer.id,
    });
    steps
}

/// Number of `others` that share every location label with `store`.
fn location_overlap(store: &StoreInfo, others: &[&StoreInfo], location_labels: &[String]) -> usize {
    if location_labels.is_empty() {
        return 0;
    }
    others
        .iter()
        .filter(|other| {
            location_labels
                .iter()
                .all(|key| store.label(key).is_some() && store.label(key) == other.label(key))
        })
        .count()
}
