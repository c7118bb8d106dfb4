//! In-flight operator accounting behind the scheduling-limit gate.

use std::sync::atomic::{AtomicU64, Ordering};

use cairn_types::{Operator, OperatorKind};

/// Reports how many operators of a category are currently in flight.
pub trait OperatorCounter: Send + Sync {
    fn operator_count(&self, kind: OperatorKind) -> u64;
}

/// Lock-free per-category counter of operators handed to the executor.
///
/// The controller compares these counts against the configured limits
/// without holding any lock, so a burst of concurrent checks can overshoot
/// a limit by a few operators. Limits are soft.
#[derive(Debug, Default)]
pub struct OperatorTracker {
    counts: [AtomicU64; OperatorKind::ALL.len()],
}

impl OperatorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an operator as in flight.
    pub fn add_operator(&self, op: &Operator) {
        let count = self.counts[op.kind() as usize].fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(kind = %op.kind(), region = %op.region_id(), count, "operator added");
    }

    /// Records an operator as finished (applied, cancelled or timed out).
    ///
    /// Finishing more operators than were added leaves the count at zero.
    pub fn finish_operator(&self, op: &Operator) {
        let _ = self.counts[op.kind() as usize].fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |count| Some(count.saturating_sub(1)),
        );
    }

    /// Total in-flight operators across all categories.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

impl OperatorCounter for OperatorTracker {
    fn operator_count(&self, kind: OperatorKind) -> u64 {
        self.counts[kind as usize].load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::RegionId;

    fn op(kind: OperatorKind) -> Operator {
        Operator::new("test", RegionId::new(1), kind, vec![])
    }

    #[test]
    fn counts_are_per_category() {
        let tracker = OperatorTracker::new();
        tracker.add_operator(&op(OperatorKind::Replica));
        tracker.add_operator(&op(OperatorKind::Replica));
        tracker.add_operator(&op(OperatorKind::Merge));

        assert_eq!(tracker.operator_count(OperatorKind::Replica), 2);
        assert_eq!(tracker.operator_count(OperatorKind::Merge), 1);
        assert_eq!(tracker.operator_count(OperatorKind::Split), 0);
        assert_eq!(tracker.total(), 3);
    }

    #[test]
    fn finish_never_underflows() {
        let tracker = OperatorTracker::new();
        tracker.add_operator(&op(OperatorKind::Merge));
        tracker.finish_operator(&op(OperatorKind::Merge));
        tracker.finish_operator(&op(OperatorKind::Merge));

        assert_eq!(tracker.operator_count(OperatorKind::Merge), 0);
    }
}
