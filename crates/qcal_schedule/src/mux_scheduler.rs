//! MUX/box scheduler for single-qubit operations
//!
//! Groups single-qubit operations into stages by control-box type and
//! into synchronized steps by MUX position. Qubits sharing a MUX never
//! run concurrently inside a stage; the synchronized variant runs exactly
//! one qubit per MUX per step.

use log::debug;
use qcal_core::{BoxType, ChipTopology, MuxId, Qid, QcalResult, MUX_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One sequential stage of the schedule
///
/// Groups within a stage may run in parallel; qids within a group run
/// strictly sequentially (hardware-box exclusivity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStage {
    /// Control-box type of every MUX in this stage
    pub box_type: BoxType,
    /// All target qids in this stage, ordered
    pub qids: Vec<Qid>,
    /// MUX ids covered by this stage
    pub mux_ids: BTreeSet<MuxId>,
    /// Per-MUX parallel groups
    pub parallel_groups: Vec<Vec<Qid>>,
}

/// Box-type staged schedule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleResult {
    /// Stages in execution order
    pub stages: Vec<ScheduleStage>,
}

impl ScheduleResult {
    /// All qids across every stage, in stage order
    pub fn all_qids(&self) -> Vec<Qid> {
        self.stages
            .iter()
            .flat_map(|s| s.qids.iter().cloned())
            .collect()
    }
}

/// One synchronized step
///
/// Every qid in `parallel_qids` executes simultaneously; steps execute
/// sequentially, grouped by box type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynchronizedStep {
    /// Step index within the whole schedule
    pub step_index: usize,
    /// Control-box type of every MUX in this step
    pub box_type: BoxType,
    /// Qids executing simultaneously (at most one per MUX)
    pub parallel_qids: BTreeSet<Qid>,
}

/// MUX/box scheduler
pub struct MuxScheduler<'a> {
    chip: &'a ChipTopology,
}

impl<'a> MuxScheduler<'a> {
    /// Create for a chip
    pub fn new(chip: &'a ChipTopology) -> Self {
        Self { chip }
    }

    // ========================================================================
    // Staged Schedule
    // ========================================================================

    /// Generate box-type stages for the given MUXes
    ///
    /// Stages run in the stable order A, B, Mixed. Within a stage each
    /// MUX contributes one parallel group whose qids run sequentially.
    pub fn generate_from_mux(
        &self,
        mux_ids: &[MuxId],
        exclude_qids: &[Qid],
    ) -> QcalResult<ScheduleResult> {
        let excluded: HashSet<&Qid> = exclude_qids.iter().collect();
        let by_box = self.group_by_box_type(mux_ids)?;

        let mut stages = Vec::new();
        for (box_type, muxes) in by_box {
            let mut stage = ScheduleStage {
                box_type,
                qids: Vec::new(),
                mux_ids: BTreeSet::new(),
                parallel_groups: Vec::new(),
            };

            for mux_id in muxes {
                let group: Vec<Qid> = self
                    .chip
                    .mux_qubits(mux_id)?
                    .iter()
                    .filter(|q| !excluded.contains(q))
                    .cloned()
                    .collect();
                if group.is_empty() {
                    continue;
                }
                stage.mux_ids.insert(mux_id);
                stage.qids.extend(group.iter().cloned());
                stage.parallel_groups.push(group);
            }

            if !stage.parallel_groups.is_empty() {
                stages.push(stage);
            }
        }

        debug!("mux schedule: {} stages", stages.len());
        Ok(ScheduleResult { stages })
    }

    // ========================================================================
    // Synchronized Schedule
    // ========================================================================

    /// Generate the 4-step checkerboard schedule
    ///
    /// Step `s` of a box-type block runs the position-`s` qubit of every
    /// MUX in the block simultaneously, bounding peak load to one
    /// operation per MUX per step. Excluded qids leave holes; fully empty
    /// steps are dropped.
    pub fn generate_synchronized(
        &self,
        mux_ids: &[MuxId],
        exclude_qids: &[Qid],
    ) -> QcalResult<Vec<SynchronizedStep>> {
        let excluded: HashSet<&Qid> = exclude_qids.iter().collect();
        let by_box = self.group_by_box_type(mux_ids)?;

        let mut steps = Vec::new();
        let mut step_index = 0;
        for (box_type, muxes) in by_box {
            for position in 0..MUX_SIZE {
                let mut parallel_qids = BTreeSet::new();
                for &mux_id in &muxes {
                    let qid = &self.chip.mux_qubits(mux_id)?[position];
                    if !excluded.contains(qid) {
                        parallel_qids.insert(qid.clone());
                    }
                }
                if parallel_qids.is_empty() {
                    continue;
                }
                steps.push(SynchronizedStep {
                    step_index,
                    box_type,
                    parallel_qids,
                });
                step_index += 1;
            }
        }

        Ok(steps)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Representative qid for a MUX-level task (position 0)
    pub fn representative_qid(&self, mux_id: MuxId) -> QcalResult<Qid> {
        Ok(self.chip.representative_qid(mux_id)?.clone())
    }

    /// Sibling qids serviced by result distribution instead of execution
    pub fn skipped_qids(&self, mux_id: MuxId) -> QcalResult<Vec<Qid>> {
        Ok(self.chip.mux_qubits(mux_id)?[1..].to_vec())
    }

    /// Group MUXes by box type, stable order A, B, Mixed
    fn group_by_box_type(&self, mux_ids: &[MuxId]) -> QcalResult<BTreeMap<BoxType, Vec<MuxId>>> {
        let mut by_box: BTreeMap<BoxType, Vec<MuxId>> = BTreeMap::new();
        for &mux_id in mux_ids {
            // Validates existence even when the box map is silent
            self.chip.mux(mux_id)?;
            by_box
                .entry(self.chip.box_type_of_mux(mux_id))
                .or_default()
                .push(mux_id);
        }
        for muxes in by_box.values_mut() {
            muxes.sort_unstable();
        }
        Ok(by_box)
    }
}

// ============================================================================
// Tests
// ============================================================================
