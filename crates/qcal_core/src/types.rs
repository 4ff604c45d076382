//! Foundation types for QCAL
//!
//! Identifiers for qubits, couplings, and MUX groups, plus the closed
//! parameter-value type used for task inputs.

use crate::error::{QcalError, QcalResult};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Qubit identifier (chip-local label, e.g. "0", "13")
pub type Qid = String;

/// MUX group identifier
pub type MuxId = usize;

/// Coupling identifier in `"<control>-<target>"` form
pub type CouplingId = String;

/// Format a coupling id from control and target qids
pub fn coupling_id(control: &str, target: &str) -> CouplingId {
    format!("{}-{}", control, target)
}

/// Split a coupling id into (control, target)
pub fn split_coupling_id(id: &str) -> QcalResult<(Qid, Qid)> {
    match id.split_once('-') {
        Some((c, t)) if !c.is_empty() && !t.is_empty() => Ok((c.to_string(), t.to_string())),
        _ => Err(QcalError::InvalidCouplingId(id.to_string())),
    }
}

// ============================================================================
// Box Types
// ============================================================================

/// Control-box type driving a MUX
///
/// A and B boxes are mutually exclusive at the stage level; Mixed marks a
/// MUX whose wiring spans both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BoxType {
    /// Type-A control box
    A,
    /// Type-B control box
    B,
    /// MUX wired to both box types
    Mixed,
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxType::A => write!(f, "A"),
            BoxType::B => write!(f, "B"),
            BoxType::Mixed => write!(f, "MIXED"),
        }
    }
}

// ============================================================================
// Parameter Values
// ============================================================================

/// Task input parameter value
///
/// Closed tagged variant resolved once at task-definition time; no
/// per-call string parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterValue {
    /// Single scalar value
    Scalar { value: f64 },
    /// Inclusive-start, exclusive-stop range with a fixed step
    Range { start: f64, stop: f64, step: f64 },
    /// Evenly spaced sequence with a fixed point count
    Linspace { start: f64, stop: f64, points: usize },
}

impl ParameterValue {
    /// Shorthand for a scalar value
    pub fn scalar(value: f64) -> Self {
        ParameterValue::Scalar { value }
    }

    /// Expand into the concrete sweep values
    pub fn resolve(&self) -> QcalResult<Vec<f64>> {
        match *self {
            ParameterValue::Scalar { value } => Ok(vec![value]),
            ParameterValue::Range { start, stop, step } => {
                if step <= 0.0 || !step.is_finite() {
                    return Err(QcalError::InvalidParameterValue(format!(
                        "range step must be positive and finite, got {}",
                        step
                    )));
                }
                if stop < start {
                    return Err(QcalError::InvalidParameterValue(format!(
                        "range stop {} before start {}",
                        stop, start
                    )));
                }
                let mut values = Vec::new();
                let mut v = start;
                while v < stop {
                    values.push(v);
                    v += step;
                }
                Ok(values)
            }
            ParameterValue::Linspace {
                start,
                stop,
                points,
            } => {
                if points == 0 {
                    return Err(QcalError::InvalidParameterValue(
                        "linspace needs at least one point".into(),
                    ));
                }
                if points == 1 {
                    return Ok(vec![start]);
                }
                let step = (stop - start) / (points - 1) as f64;
                Ok((0..points).map(|i| start + step * i as f64).collect())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
