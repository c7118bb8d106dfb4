//! Synchronous region patrol: the loop that feeds regions to the controller.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use cairn_types::{Operator, RegionId};

use crate::cluster::ClusterInformer;
use crate::controller::CheckerController;
use crate::operator_count::OperatorTracker;

/// Walks the key space in batches and collects the operators to schedule.
///
/// Each pass first retries deferred regions (waiting list, then due
/// priority regions), then checks the next `batch` regions in key order,
/// wrapping around at the end of the key space. Every returned operator
/// has already been recorded in the tracker, so the limit gate sees it on
/// the next check.
pub struct RegionPatrol {
    cluster: Arc<dyn ClusterInformer>,
    controller: Arc<CheckerController>,
    tracker: Arc<OperatorTracker>,
    /// Start key of the next sweep batch.
    next_key: Mutex<Bytes>,
}

impl RegionPatrol {
    pub fn new(
        cluster: Arc<dyn ClusterInformer>,
        controller: Arc<CheckerController>,
        tracker: Arc<OperatorTracker>,
    ) -> Self {
        Self {
            cluster,
            controller,
            tracker,
            next_key: Mutex::new(Bytes::new()),
        }
    }

    /// Runs one patrol pass over at most `batch` regions plus any retries.
    pub fn patrol_once(&self, batch: usize) -> Vec<Operator> {
        let mut ops = Vec::new();
        let mut seen: HashSet<RegionId> = HashSet::new();

        for region_id in self.controller.waiting_regions() {
            let Some(region) = self.cluster.get_region(region_id) else {
                self.controller.remove_waiting_region(region_id);
                continue;
            };
            seen.insert(region_id);
            let region_ops = self.controller.check_region(&region);
            if !region_ops.is_empty() {
                self.controller.remove_waiting_region(region_id);
                self.admit(&mut ops, &mut seen, region_ops);
            }
        }

        for region_id in self.controller.priority_regions() {
            if !seen.insert(region_id) {
                continue;
            }
            let Some(region) = self.cluster.get_region(region_id) else {
                self.controller.remove_priority_region(region_id);
                continue;
            };
            let region_ops = self.controller.check_region(&region);
            self.admit(&mut ops, &mut seen, region_ops);
        }

        let mut next_key = self.next_key.lock().unwrap_or_else(PoisonError::into_inner);
        let regions = self.cluster.scan_regions(&next_key, batch);
        for region in &regions {
            if !seen.insert(region.id()) {
                continue;
            }
            let region_ops = self.controller.check_region(region);
            self.admit(&mut ops, &mut seen, region_ops);
        }
        *next_key = match regions.last() {
            Some(last) if regions.len() == batch && !last.end_key().is_empty() => {
                Bytes::copy_from_slice(last.end_key())
            }
            _ => Bytes::new(),
        };

        tracing::debug!(operators = ops.len(), scanned = regions.len(), "patrol pass finished");
        ops
    }

    /// Registers a check's operators as in flight. Merge pairs arrive
    /// together and are registered together; the merge target is not
    /// checked again in the same pass.
    fn admit(
        &self,
        ops: &mut Vec<Operator>,
        seen: &mut HashSet<RegionId>,
        region_ops: Vec<Operator>,
    ) {
        for op in &region_ops {
            seen.insert(op.region_id());
            self.tracker.add_operator(op);
        }
        ops.extend(region_ops);
    }
}
