//! Cross-resonance pairs
//!
//! An ordered control -> target qubit pair targeted for two-qubit gate
//! calibration.

use qcal_core::{coupling_id, split_coupling_id, ChipTopology, CouplingId, MuxId, Qid, QcalResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered control -> target pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrPair {
    /// Control (drive) qubit
    pub control: Qid,
    /// Target qubit
    pub target: Qid,
}

impl CrPair {
    /// Create a pair
    pub fn new(control: impl Into<Qid>, target: impl Into<Qid>) -> Self {
        Self {
            control: control.into(),
            target: target.into(),
        }
    }

    /// Parse from `"<control>-<target>"`
    pub fn parse(id: &str) -> QcalResult<Self> {
        let (control, target) = split_coupling_id(id)?;
        Ok(Self { control, target })
    }

    /// Coupling id form `"<control>-<target>"`
    pub fn id(&self) -> CouplingId {
        coupling_id(&self.control, &self.target)
    }

    /// The reversed pair
    pub fn reversed(&self) -> Self {
        Self {
            control: self.target.clone(),
            target: self.control.clone(),
        }
    }

    /// MUX ids touched by this pair (deduplicated when both endpoints
    /// share a MUX)
    pub fn muxes(&self, chip: &ChipTopology) -> Vec<MuxId> {
        let mut muxes = Vec::new();
        if let Some(m) = chip.mux_of(&self.control) {
            muxes.push(m);
        }
        if let Some(m) = chip.mux_of(&self.target) {
            if !muxes.contains(&m) {
                muxes.push(m);
            }
        }
        muxes
    }

    /// Check whether two pairs touch a common MUX
    pub fn shares_mux_with(&self, other: &CrPair, chip: &ChipTopology) -> bool {
        let mine = self.muxes(chip);
        other.muxes(chip).iter().any(|m| mine.contains(m))
    }
}

impl fmt::Display for CrPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.control, self.target)
    }
}

// ============================================================================
// Tests
// ============================================================================
