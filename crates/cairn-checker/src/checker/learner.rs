//! Promotes caught-up learners when placement rules are off.

use cairn_types::{Operator, OperatorKind, OperatorStep, RegionInfo};

use crate::checker::{Checker, CheckerKind};
use crate::pause::PauseController;

/// Promotes the first learner that is neither down nor pending.
#[derive(Debug, Default)]
pub struct LearnerChecker {
    pause: PauseController,
}

impl LearnerChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checker for LearnerChecker {
    type Output = Operator;

    fn kind(&self) -> CheckerKind {
        CheckerKind::Learner
    }

    fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    fn check(&self, region: &RegionInfo) -> Option<Operator> {
        if self.is_paused() {
            tracing::trace!(region = %region.id(), "learner checker paused");
            return None;
        }

        let learner = region
            .learners()
            .find(|p| !region.is_down_peer(p.id) && !region.is_pending_peer(p.id))?;
        let op = Operator::new(
            "promote-learner",
            region.id(),
            OperatorKind::Region,
            vec![OperatorStep::PromoteLearner {
                store_id: learner.store_id,
                peer_id: learner.id,
            }],
        );
        tracing::debug!(region = %region.id(), op = %op, "learner checker proposed operator");
        Some(op)
    }
}
