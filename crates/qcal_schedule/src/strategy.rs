//! Parallel grouping strategies
//!
//! A strategy turns the filtered pair list into parallel groups such that
//! no two pairs in one group share a MUX. The grouping heuristic is
//! swappable; only the conflict-freedom property is fixed.

use crate::cr_pair::CrPair;
use log::debug;
use qcal_core::{MuxId, Qid, QcalError, QcalResult};
use std::collections::HashMap;

/// Read-only context for a grouping strategy
pub struct ScheduleContext {
    /// qid -> MUX id map for the chip
    pub qid_to_mux: HashMap<Qid, MuxId>,
    /// Maximum pairs per parallel group
    pub max_parallel_ops: usize,
}

impl ScheduleContext {
    /// MUX ids touched by a pair
    fn muxes_of(&self, pair: &CrPair) -> Vec<MuxId> {
        let mut muxes = Vec::new();
        if let Some(&m) = self.qid_to_mux.get(&pair.control) {
            muxes.push(m);
        }
        if let Some(&m) = self.qid_to_mux.get(&pair.target) {
            if !muxes.contains(&m) {
                muxes.push(m);
            }
        }
        muxes
    }

    /// Check whether two pairs touch a common MUX
    fn conflicts(&self, a: &CrPair, b: &CrPair) -> bool {
        let mine = self.muxes_of(a);
        self.muxes_of(b).iter().any(|m| mine.contains(m))
    }

    fn require_capacity(&self, strategy: &str) -> QcalResult<()> {
        if self.max_parallel_ops == 0 {
            return Err(QcalError::ConflictResolution(format!(
                "{}: max_parallel_ops must be at least 1",
                strategy
            )));
        }
        Ok(())
    }
}

/// Grouping strategy seam
pub trait GroupingStrategy: Send + Sync {
    /// Strategy name, for logging
    fn name(&self) -> &'static str;

    /// Partition `pairs` into ordered parallel groups
    fn schedule(&self, pairs: Vec<CrPair>, ctx: &ScheduleContext) -> QcalResult<Vec<Vec<CrPair>>>;
}

// ============================================================================
// Greedy Coloring
// ============================================================================

/// Largest-degree-first greedy coloring over the MUX conflict graph
///
/// Each pair joins the lowest-indexed color class with no conflicting
/// member and fewer than `max_parallel_ops` members, opening a new class
/// when none fits.
pub struct GreedyColoringStrategy;

impl GroupingStrategy for GreedyColoringStrategy {
    fn name(&self) -> &'static str {
        "greedy_coloring"
    }

    fn schedule(&self, pairs: Vec<CrPair>, ctx: &ScheduleContext) -> QcalResult<Vec<Vec<CrPair>>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        ctx.require_capacity(self.name())?;

        // Conflict degree per node
        let degree: Vec<usize> = pairs
            .iter()
            .map(|p| pairs.iter().filter(|q| *q != p && ctx.conflicts(p, q)).count())
            .collect();

        let mut order: Vec<usize> = (0..pairs.len()).collect();
        order.sort_by(|&a, &b| degree[b].cmp(&degree[a]).then(a.cmp(&b)));

        let mut groups: Vec<Vec<CrPair>> = Vec::new();
        for idx in order {
            let pair = &pairs[idx];
            let slot = groups.iter().position(|g| {
                g.len() < ctx.max_parallel_ops && g.iter().all(|other| !ctx.conflicts(pair, other))
            });
            match slot {
                Some(i) => groups[i].push(pair.clone()),
                None => groups.push(vec![pair.clone()]),
            }
        }

        debug!(
            "greedy coloring: {} pairs into {} groups",
            pairs.len(),
            groups.len()
        );
        Ok(groups)
    }
}

// ============================================================================
// MUX-Aware Composite
// ============================================================================

/// Color within each MUX cluster first, then merge compatible groups
///
/// Pairs are clustered by the lowest MUX id they touch; each cluster is
/// colored independently, and the resulting per-cluster groups are merged
/// across clusters where no MUX conflict arises and the group-size cap
/// holds.
pub struct MuxAwareCompositeStrategy;

impl GroupingStrategy for MuxAwareCompositeStrategy {
    fn name(&self) -> &'static str {
        "mux_aware_composite"
    }

    fn schedule(&self, pairs: Vec<CrPair>, ctx: &ScheduleContext) -> QcalResult<Vec<Vec<CrPair>>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        ctx.require_capacity(self.name())?;

        // Cluster by lowest touched MUX; pairs off the MUX map go last
        let mut clusters: HashMap<Option<MuxId>, Vec<CrPair>> = HashMap::new();
        for pair in pairs {
            let key = ctx.muxes_of(&pair).into_iter().min();
            clusters.entry(key).or_default().push(pair);
        }
        let mut keys: Vec<Option<MuxId>> = clusters.keys().copied().collect();
        keys.sort();

        // Color each cluster independently
        let inner = GreedyColoringStrategy;
        let mut local_groups: Vec<Vec<CrPair>> = Vec::new();
        for key in keys {
            let cluster = clusters.remove(&key).unwrap_or_default();
            local_groups.extend(inner.schedule(cluster, ctx)?);
        }

        // Merge inter-cluster groups that stay conflict-free under the cap
        let mut merged: Vec<Vec<CrPair>> = Vec::new();
        for group in local_groups {
            let slot = merged.iter().position(|g| {
                g.len() + group.len() <= ctx.max_parallel_ops
                    && group
                        .iter()
                        .all(|p| g.iter().all(|other| !ctx.conflicts(p, other)))
            });
            match slot {
                Some(i) => merged[i].extend(group),
                None => merged.push(group),
            }
        }

        Ok(merged)
    }
}

// ============================================================================
// Tests
// ============================================================================
