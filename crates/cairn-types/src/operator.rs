//! Corrective actions proposed by the checkers.

use std::fmt::Display;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{PeerId, RegionId, StoreId};

/// Category of an operator, used for scheduling-limit accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperatorKind {
    /// Leadership transfer only.
    Leader,
    /// Membership change that does not move data (e.g. learner promotion).
    Region,
    /// Adds, removes or replaces replicas.
    Replica,
    Split,
    Merge,
    /// Raft configuration housekeeping, e.g. leaving a joint state.
    Admin,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 6] = [
        OperatorKind::Leader,
        OperatorKind::Region,
        OperatorKind::Replica,
        OperatorKind::Split,
        OperatorKind::Merge,
        OperatorKind::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperatorKind::Leader => "leader",
            OperatorKind::Region => "region",
            OperatorKind::Replica => "replica",
            OperatorKind::Split => "split",
            OperatorKind::Merge => "merge",
            OperatorKind::Admin => "admin",
        }
    }
}

impl Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority of an operator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum OperatorPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// One atomic mutation applied by the operator executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorStep {
    AddLearner {
        store_id: StoreId,
        peer_id: PeerId,
    },
    PromoteLearner {
        store_id: StoreId,
        peer_id: PeerId,
    },
    DemoteVoter {
        store_id: StoreId,
        peer_id: PeerId,
    },
    RemovePeer {
        store_id: StoreId,
        peer_id: PeerId,
    },
    /// Finalises a joint configuration: incoming voters become voters and
    /// demoting voters become learners.
    LeaveJointState,
    TransferLeader {
        from: StoreId,
        to: StoreId,
    },
    SplitRegion {
        keys: Vec<Bytes>,
    },
    MergeRegion {
        source: RegionId,
        target: RegionId,
        /// The target side of a merge only waits for the source to finish.
        is_passive: bool,
    },
}

/// A pending mutation to cluster state for a single region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    desc: String,
    region_id: RegionId,
    kind: OperatorKind,
    priority: OperatorPriority,
    steps: Vec<OperatorStep>,
}

impl Operator {
    pub fn new(
        desc: impl Into<String>,
        region_id: RegionId,
        kind: OperatorKind,
        steps: Vec<OperatorStep>,
    ) -> Self {
        Self {
            desc: desc.into(),
            region_id,
            kind,
            priority: OperatorPriority::default(),
            steps,
        }
    }

    pub fn with_priority(mut self, priority: OperatorPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn region_id(&self) -> RegionId {
        self.region_id
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn priority(&self) -> OperatorPriority {
        self.priority
    }

    pub fn steps(&self) -> &[OperatorStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (kind:{}, region:{}, steps:{})",
            self.desc,
            self.kind,
            self.region_id,
            self.steps.len()
        )
    }
}
