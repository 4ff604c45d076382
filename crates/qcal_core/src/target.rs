//! Calibration targets
//!
//! A target names what the user wants calibrated; resolution turns it
//! into concrete qubit and coupling id lists via the chip topology.
//! Targets are immutable once constructed.

use crate::chip::ChipTopology;
use crate::error::QcalResult;
use crate::types::{coupling_id, CouplingId, MuxId, Qid};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// User-specified calibration target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// Specific MUX groups, minus excluded qubits
    Mux {
        mux_ids: Vec<MuxId>,
        #[serde(default)]
        exclude_qids: Vec<Qid>,
    },
    /// Explicit qubit list
    Qubits { qids: Vec<Qid> },
    /// Explicit coupling-pair list
    Couplings { pairs: Vec<CouplingId> },
    /// Every MUX on the chip, minus excluded qubits
    AllMux {
        #[serde(default)]
        exclude_qids: Vec<Qid>,
    },
}

/// Concrete qubit/coupling lists a target resolves to
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedTarget {
    /// Target qubits, deterministic order
    pub qids: Vec<Qid>,
    /// Target couplings, deterministic order
    pub couplings: Vec<CouplingId>,
}

impl Target {
    /// Resolve to concrete qubit and coupling id lists
    pub fn resolve(&self, chip: &ChipTopology) -> QcalResult<ResolvedTarget> {
        match self {
            Target::Mux {
                mux_ids,
                exclude_qids,
            } => Self::resolve_muxes(chip, mux_ids, exclude_qids),
            Target::Qubits { qids } => Ok(ResolvedTarget {
                qids: sorted_qids(qids.clone()),
                couplings: Vec::new(),
            }),
            Target::Couplings { pairs } => Ok(ResolvedTarget {
                qids: Vec::new(),
                couplings: pairs.clone(),
            }),
            Target::AllMux { exclude_qids } => {
                let all: Vec<MuxId> = chip.mux_ids().into_iter().collect();
                Self::resolve_muxes(chip, &all, exclude_qids)
            }
        }
    }

    fn resolve_muxes(
        chip: &ChipTopology,
        mux_ids: &[MuxId],
        exclude_qids: &[Qid],
    ) -> QcalResult<ResolvedTarget> {
        let excluded: HashSet<&Qid> = exclude_qids.iter().collect();

        let mut qids = Vec::new();
        for &mux_id in mux_ids {
            for qid in chip.mux_qubits(mux_id)? {
                if !excluded.contains(qid) {
                    qids.push(qid.clone());
                }
            }
        }
        let qids = sorted_qids(qids);

        // Couplings fully inside the target qubit set
        let selected: HashSet<&Qid> = qids.iter().collect();
        let couplings = chip
            .couplings()
            .iter()
            .filter(|(a, b)| selected.contains(a) && selected.contains(b))
            .map(|(a, b)| coupling_id(a, b))
            .collect();

        Ok(ResolvedTarget { qids, couplings })
    }
}

/// Sort qids numerically where possible, lexically otherwise
fn sorted_qids(mut qids: Vec<Qid>) -> Vec<Qid> {
    qids.sort_by(|a, b| match (a.parse::<usize>(), b.parse::<usize>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    });
    qids.dedup();
    qids
}

// ============================================================================
// Tests
// ============================================================================
