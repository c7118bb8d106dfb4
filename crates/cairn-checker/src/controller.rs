//! The checker controller: one region in, zero to two operators out.

use std::sync::Arc;

use cairn_types::{Operator, OperatorKind, RegionId, RegionInfo};

use crate::checker::{
    Checker, CheckerKind, JointStateChecker, LearnerChecker, MergeChecker, PriorityChecker,
    ReplicaChecker, RuleChecker, SplitChecker,
};
use crate::cluster::ClusterInformer;
use crate::error::Result;
use crate::labeler::RegionLabeler;
use crate::metrics::LimitMetrics;
use crate::operator_count::OperatorCounter;
use crate::pause::PauseController;
use crate::placement::RuleManager;
use crate::waiting_list::RegionWaitingList;

/// Owns the seven checkers and decides which of them repairs a region.
///
/// Checkers are consulted in a fixed order and the first proposal wins:
/// joint state, split, then either the placement-rule branch (priority fit
/// feeding the rule checker) or the legacy branch (learner, then replica),
/// and finally merge. Replica and merge proposals pass through the
/// in-flight limit gate; a blocked replica repair parks the region on the
/// waiting list for the driver to retry.
///
/// All methods take `&self`; the controller is shared across driver
/// workers behind an `Arc`.
pub struct CheckerController {
    cluster: Arc<dyn ClusterInformer>,
    op_counter: Arc<dyn OperatorCounter>,
    metrics: Arc<dyn LimitMetrics>,
    waiting_list: Arc<RegionWaitingList>,
    joint_state_checker: JointStateChecker,
    split_checker: SplitChecker,
    priority_checker: PriorityChecker,
    rule_checker: RuleChecker,
    learner_checker: LearnerChecker,
    replica_checker: ReplicaChecker,
    merge_checker: MergeChecker,
}

impl CheckerController {
    /// Builds the controller and its checkers.
    ///
    /// # Errors
    ///
    /// Returns [`CheckerError::InvalidConfig`](crate::CheckerError::InvalidConfig)
    /// if the cluster's current configuration fails validation.
    pub fn new(
        cluster: Arc<dyn ClusterInformer>,
        rule_manager: Arc<RuleManager>,
        labeler: Arc<RegionLabeler>,
        op_counter: Arc<dyn OperatorCounter>,
        metrics: Arc<dyn LimitMetrics>,
    ) -> Result<Self> {
        let config = cluster.options().snapshot();
        config.validate()?;

        let waiting_list = Arc::new(RegionWaitingList::new(config.schedule.waiting_list_capacity));
        tracing::debug!(
            waiting_list_capacity = config.schedule.waiting_list_capacity,
            priority_queue_capacity = config.schedule.priority_queue_capacity,
            placement_rules = config.replication.enable_placement_rules,
            "checker controller created"
        );

        Ok(Self {
            joint_state_checker: JointStateChecker::new(Arc::clone(&cluster)),
            split_checker: SplitChecker::new(
                Arc::clone(&cluster),
                Arc::clone(&rule_manager),
                labeler,
            ),
            priority_checker: PriorityChecker::new(
                Arc::clone(&cluster),
                Arc::clone(&rule_manager),
                config.schedule.priority_queue_capacity,
            ),
            rule_checker: RuleChecker::new(
                Arc::clone(&cluster),
                rule_manager,
                Arc::clone(&waiting_list),
            ),
            learner_checker: LearnerChecker::new(),
            replica_checker: ReplicaChecker::new(Arc::clone(&cluster), Arc::clone(&waiting_list)),
            merge_checker: MergeChecker::new(Arc::clone(&cluster)),
            cluster,
            op_counter,
            metrics,
            waiting_list,
        })
    }

    // ========================================================================
    // Region decision policy
    // ========================================================================

    /// Returns the operators to schedule for `region`.
    ///
    /// The result holds zero operators (nothing to do, or deferred), one
    /// operator, or the two halves of a merge, which must be admitted
    /// together.
    pub fn check_region(&self, region: &RegionInfo) -> Vec<Operator> {
        if let Some(op) = self.joint_state_checker.check(region) {
            return vec![op];
        }
        if let Some(op) = self.split_checker.check(region) {
            return vec![op];
        }

        if self.cluster.options().is_placement_rules_enabled() {
            // No fit means the priority checker is paused; skip the rule branch.
            if let Some(fit) = self.priority_checker.check(region) {
                if let Some(op) = self.rule_checker.check_with_fit(region, &fit) {
                    if self.replica_allowed() {
                        return vec![op];
                    }
                    self.defer(region, CheckerKind::Rule);
                }
            }
        } else {
            if let Some(op) = self.learner_checker.check(region) {
                return vec![op];
            }
            if let Some(op) = self.replica_checker.check(region) {
                if self.replica_allowed() {
                    return vec![op];
                }
                self.defer(region, CheckerKind::Replica);
            }
        }

        let merge_limit = self.cluster.options().merge_schedule_limit();
        if self.op_counter.operator_count(OperatorKind::Merge) < merge_limit {
            if let Some(ops) = self.merge_checker.check(region) {
                return ops.into_vec();
            }
        } else {
            tracing::trace!(region = %region.id(), merge_limit, "merge limit reached");
            self.metrics
                .inc_limit_exceeded(CheckerKind::Merge, OperatorKind::Merge);
        }

        Vec::new()
    }

    fn replica_allowed(&self) -> bool {
        self.op_counter.operator_count(OperatorKind::Replica)
            < self.cluster.options().replica_schedule_limit()
    }

    /// Records a replica repair blocked by the limit.
    fn defer(&self, region: &RegionInfo, checker: CheckerKind) {
        self.metrics.inc_limit_exceeded(checker, OperatorKind::Replica);
        self.waiting_list.put(region.id());
        tracing::debug!(region = %region.id(), %checker, "replica limit reached, region deferred");
    }

    // ========================================================================
    // Checker accessors
    // ========================================================================

    /// Tells the merge checker that `region_ids` came out of a split.
    ///
    /// Call this from the heartbeat path whenever a split is applied; the
    /// regions are then kept out of merges for `split_merge_interval_secs`.
    pub fn record_region_split(&self, region_ids: &[RegionId]) {
        tracing::debug!(regions = ?region_ids, "recording region split");
        self.merge_checker.record_region_split(region_ids);
    }

    pub fn merge_checker(&self) -> &MergeChecker {
        &self.merge_checker
    }

    pub fn rule_checker(&self) -> &RuleChecker {
        &self.rule_checker
    }

    pub fn priority_checker(&self) -> &PriorityChecker {
        &self.priority_checker
    }

    // ========================================================================
    // Waiting list
    // ========================================================================

    /// Regions deferred by a limit, oldest first.
    pub fn waiting_regions(&self) -> Vec<RegionId> {
        self.waiting_list.elems()
    }

    /// Forces a region onto the waiting list.
    pub fn add_waiting_region(&self, region: &RegionInfo) {
        self.waiting_list.put(region.id());
    }

    pub fn remove_waiting_region(&self, region_id: RegionId) -> bool {
        self.waiting_list.remove(region_id)
    }

    // ========================================================================
    // Priority queue
    // ========================================================================

    pub fn priority_regions(&self) -> Vec<RegionId> {
        self.priority_checker.get_priority_regions()
    }

    pub fn remove_priority_region(&self, region_id: RegionId) -> bool {
        self.priority_checker.remove_priority_region(region_id)
    }

    // ========================================================================
    // Pause control
    // ========================================================================

    /// Looks up a checker's pause switch by name.
    ///
    /// # Errors
    ///
    /// Returns [`CheckerError::CheckerNotFound`](crate::CheckerError::CheckerNotFound)
    /// unless `name` is exactly one of the seven checker names.
    pub fn pause_controller(&self, name: &str) -> Result<&PauseController> {
        let kind: CheckerKind = name.parse()?;
        Ok(self.pause_controller_for(kind))
    }

    pub fn pause_controller_for(&self, kind: CheckerKind) -> &PauseController {
        match kind {
            CheckerKind::Learner => self.learner_checker.pause_controller(),
            CheckerKind::Replica => self.replica_checker.pause_controller(),
            CheckerKind::Rule => self.rule_checker.pause_controller(),
            CheckerKind::Split => self.split_checker.pause_controller(),
            CheckerKind::Merge => self.merge_checker.pause_controller(),
            CheckerKind::JointState => self.joint_state_checker.pause_controller(),
            CheckerKind::Priority => self.priority_checker.pause_controller(),
        }
    }
}
