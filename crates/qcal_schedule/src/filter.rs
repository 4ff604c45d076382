//! Pair filter chain
//!
//! Each filter receives the surviving pair list and a read-only context
//! and returns a subset. Filters compose by explicit list on the
//! scheduler, in application order.

use crate::cr_pair::CrPair;
use qcal_core::{ChipTopology, CouplingId, Qid};
use std::collections::{HashMap, HashSet};

/// Read-only context shared by every filter in a chain
pub struct FilterContext<'a> {
    /// Chip topology
    pub chip: &'a ChipTopology,
    /// Measured qubit frequencies (GHz), possibly empty early in a flow
    pub qubit_frequency: &'a HashMap<Qid, f64>,
    /// Last-known two-qubit gate fidelities
    pub gate_fidelity: &'a HashMap<CouplingId, f64>,
}

/// One step of the pair filter chain
pub trait PairFilter: Send + Sync {
    /// Filter name, for logging
    fn name(&self) -> &'static str;

    /// Return the subset of `pairs` that survive this filter
    fn apply(&self, pairs: Vec<CrPair>, ctx: &FilterContext) -> Vec<CrPair>;
}

// ============================================================================
// Candidate Qubit Filter
// ============================================================================

/// Restrict pairs to an allow-list of qubits
///
/// Both endpoints must be allowed for the pair to survive.
pub struct CandidateQubitFilter {
    allowed: HashSet<Qid>,
}

impl CandidateQubitFilter {
    /// Create from an allow-list
    pub fn new(allowed: impl IntoIterator<Item = Qid>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl PairFilter for CandidateQubitFilter {
    fn name(&self) -> &'static str {
        "candidate_qubit"
    }

    fn apply(&self, pairs: Vec<CrPair>, _ctx: &FilterContext) -> Vec<CrPair> {
        pairs
            .into_iter()
            .filter(|p| self.allowed.contains(&p.control) && self.allowed.contains(&p.target))
            .collect()
    }
}

// ============================================================================
// Frequency Directionality Filter
// ============================================================================

/// Keep `a-b` only when `a` is the low-frequency side
///
/// Direction sources, in priority order: an explicitly declared topology
/// direction, the design checkerboard parity when either endpoint lacks a
/// measured frequency, then the measured frequencies themselves. Pairs
/// with no resolvable source are excluded, not failed. The `inverse` flag
/// selects the opposite direction throughout.
pub struct FrequencyDirectionalityFilter {
    inverse: bool,
}

impl FrequencyDirectionalityFilter {
    /// Standard direction: control frequency below target frequency
    pub fn new() -> Self {
        Self { inverse: false }
    }

    /// Inverted direction: control frequency above target frequency
    pub fn inverse() -> Self {
        Self { inverse: true }
    }

    /// Decide whether control -> target is the preferred direction,
    /// before the inverse flag is applied
    fn forward(&self, pair: &CrPair, ctx: &FilterContext) -> Option<bool> {
        // 1. Topology declaration wins outright
        if let Some(declared) = ctx.chip.declared_direction(&pair.control, &pair.target) {
            return Some(declared);
        }

        let f_control = ctx.qubit_frequency.get(&pair.control);
        let f_target = ctx.qubit_frequency.get(&pair.target);

        // 2. Design parity stands in while frequencies are unmeasured
        if f_control.is_none() || f_target.is_none() {
            let low_control = ctx.chip.design_parity(&pair.control)?;
            let low_target = ctx.chip.design_parity(&pair.target)?;
            if low_control == low_target {
                // Same design parity carries no direction information
                return None;
            }
            return Some(low_control);
        }

        // 3. Measured frequencies
        Some(f_control? < f_target?)
    }
}

impl Default for FrequencyDirectionalityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PairFilter for FrequencyDirectionalityFilter {
    fn name(&self) -> &'static str {
        "frequency_directionality"
    }

    fn apply(&self, pairs: Vec<CrPair>, ctx: &FilterContext) -> Vec<CrPair> {
        pairs
            .into_iter()
            .filter(|p| match self.forward(p, ctx) {
                Some(forward) => forward != self.inverse,
                None => false,
            })
            .collect()
    }
}

// ============================================================================
// Fidelity Filter
// ============================================================================

/// Drop pairs whose last-known gate fidelity is below a threshold
///
/// Pairs with no recorded fidelity are kept; they have simply never been
/// measured.
pub struct FidelityFilter {
    threshold: f64,
}

impl FidelityFilter {
    /// Create with an acceptance threshold
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl PairFilter for FidelityFilter {
    fn name(&self) -> &'static str {
        "fidelity"
    }

    fn apply(&self, pairs: Vec<CrPair>, ctx: &FilterContext) -> Vec<CrPair> {
        pairs
            .into_iter()
            .filter(|p| match ctx.gate_fidelity.get(&p.id()) {
                Some(&f) => f >= self.threshold,
                None => true,
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
