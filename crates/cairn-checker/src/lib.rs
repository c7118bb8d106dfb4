//! cairn-checker: Region repair for `Cairn`
//!
//! The [`CheckerController`] decides, for one region at a time, which
//! corrective operators the placement controller should schedule. It owns
//! seven checkers and consults them as a strict priority chain:
//!
//! 1. **Joint state**: finish an in-progress raft configuration change
//! 2. **Split**: split a region straddling a rule or label boundary
//! 3. **Placement rules** (rules enabled): priority fit, then rule repair
//! 4. **Legacy replicas** (rules disabled): learner promotion, then replica repair
//! 5. **Merge**: fold a small region into a neighbour
//!
//! Replica repairs and merges are gated by the number of in-flight
//! operators of their category. A blocked replica repair is counted and
//! its region parked on a bounded waiting list; [`RegionPatrol`] retries
//! parked regions on its next pass.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cairn_checker::{
//!     CheckerController, ClusterInformer, InMemoryCluster, NoopLimitMetrics, OperatorTracker,
//!     RegionLabeler, RuleManager,
//! };
//! use cairn_config::CairnConfig;
//! use cairn_types::{Peer, RegionId, RegionInfo, StoreInfo};
//!
//! let cluster = Arc::new(InMemoryCluster::new(CairnConfig::default()));
//! for id in 1..=3 {
//!     cluster.put_store(StoreInfo::new(id));
//! }
//!
//! let controller = CheckerController::new(
//!     Arc::clone(&cluster) as Arc<dyn ClusterInformer>,
//!     Arc::new(RuleManager::new(3)),
//!     Arc::new(RegionLabeler::new()),
//!     Arc::new(OperatorTracker::new()),
//!     Arc::new(NoopLimitMetrics),
//! )
//! .unwrap();
//!
//! // Two replicas where three are required: the rule checker adds one.
//! let region = RegionInfo::new(
//!     RegionId::new(1),
//!     "",
//!     "",
//!     vec![Peer::voter(11, 1), Peer::voter(12, 2)],
//! );
//! let ops = controller.check_region(&region);
//! assert_eq!(ops.len(), 1);
//! assert_eq!(ops[0].desc(), "add-rule-peer");
//!
//! // The heartbeat path reports applied splits so the halves are not
//! // merged straight back.
//! controller.record_region_split(&[RegionId::new(1), RegionId::new(2)]);
//!
//! // Unknown checker names are rejected.
//! assert!(controller.pause_controller("balance").is_err());
//! ```

mod checker;
mod cluster;
mod controller;
mod error;
mod keys;
mod labeler;
mod metrics;
mod operator_count;
mod patrol;
mod pause;
mod placement;
mod waiting_list;

pub use checker::{
    Checker, CheckerKind, JointStateChecker, LearnerChecker, MergeChecker, MergeOperators,
    PriorityChecker, PriorityEntry, ReplicaChecker, RuleChecker, SplitChecker,
};
pub use cluster::{ClusterInformer, InMemoryCluster};
pub use controller::CheckerController;
pub use error::{CheckerError, Result};
pub use labeler::{KeyRange, LabelRule, RegionLabel, RegionLabeler};
pub use metrics::{
    LimitMetrics, NoopLimitMetrics, OPERATOR_LIMIT_METRIC, PrometheusLimitMetrics,
};
pub use operator_count::{OperatorCounter, OperatorTracker};
pub use patrol::RegionPatrol;
pub use pause::PauseController;
pub use placement::{
    DEFAULT_GROUP_ID, DEFAULT_RULE_ID, LabelConstraint, LabelConstraintOp, RegionFit, Rule,
    RuleFit, RuleManager, RuleRole,
};
pub use waiting_list::RegionWaitingList;
