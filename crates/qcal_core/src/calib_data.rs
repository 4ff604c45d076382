//! Measured calibration data
//!
//! Per-qubit and per-coupling parameter maps, mutated by the result
//! pipeline on every successful output commit and read back by the
//! schedulers that need measured frequencies.

use crate::types::{CouplingId, Qid};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known parameter name for measured qubit frequency (GHz)
pub const PARAM_QUBIT_FREQUENCY: &str = "qubit_frequency";

/// Well-known parameter name for two-qubit gate fidelity
pub const PARAM_BELL_STATE_FIDELITY: &str = "bell_state_fidelity";

/// Measured calibration values for one chip
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibData {
    /// Per-qubit parameters
    pub qubit: HashMap<Qid, HashMap<String, f64>>,
    /// Per-coupling parameters
    pub coupling: HashMap<CouplingId, HashMap<String, f64>>,
}

impl CalibData {
    /// Create empty calibration data
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Writers
    // ========================================================================

    /// Store one qubit parameter
    pub fn put_qubit_param(&mut self, qid: &str, name: &str, value: f64) {
        self.qubit
            .entry(qid.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Store one coupling parameter
    pub fn put_coupling_param(&mut self, cid: &str, name: &str, value: f64) {
        self.coupling
            .entry(cid.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Merge another calibration snapshot, additive per entity
    pub fn merge(&mut self, other: &CalibData) {
        for (qid, params) in &other.qubit {
            let entry = self.qubit.entry(qid.clone()).or_default();
            for (name, value) in params {
                entry.insert(name.clone(), *value);
            }
        }
        for (cid, params) in &other.coupling {
            let entry = self.coupling.entry(cid.clone()).or_default();
            for (name, value) in params {
                entry.insert(name.clone(), *value);
            }
        }
    }

    // ========================================================================
    // Readers
    // ========================================================================

    /// Read one qubit parameter
    pub fn qubit_param(&self, qid: &str, name: &str) -> Option<f64> {
        self.qubit.get(qid)?.get(name).copied()
    }

    /// Read one coupling parameter
    pub fn coupling_param(&self, cid: &str, name: &str) -> Option<f64> {
        self.coupling.get(cid)?.get(name).copied()
    }

    /// Measured qubit frequencies, for the directionality filter
    pub fn qubit_frequencies(&self) -> HashMap<Qid, f64> {
        self.qubit
            .iter()
            .filter_map(|(qid, params)| {
                params
                    .get(PARAM_QUBIT_FREQUENCY)
                    .map(|f| (qid.clone(), *f))
            })
            .collect()
    }

    /// Last-known two-qubit gate fidelities, for the fidelity filter
    pub fn gate_fidelities(&self) -> HashMap<CouplingId, f64> {
        self.coupling
            .iter()
            .filter_map(|(cid, params)| {
                params
                    .get(PARAM_BELL_STATE_FIDELITY)
                    .map(|f| (cid.clone(), *f))
            })
            .collect()
    }

    /// Check if no parameters are recorded at all
    pub fn is_empty(&self) -> bool {
        self.qubit.is_empty() && self.coupling.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_put_and_get() {
        let mut data = CalibData::new();
        data.put_qubit_param("0", PARAM_QUBIT_FREQUENCY, 7.2);
        data.put_coupling_param("0-1", PARAM_BELL_STATE_FIDELITY, 0.97);

        assert_relative_eq!(data.qubit_param("0", PARAM_QUBIT_FREQUENCY).unwrap(), 7.2);
        assert_relative_eq!(
            data.coupling_param("0-1", PARAM_BELL_STATE_FIDELITY).unwrap(),
            0.97
        );
        assert!(data.qubit_param("1", PARAM_QUBIT_FREQUENCY).is_none());
    }

    #[test]
    fn test_qubit_frequencies() {
        let mut data = CalibData::new();
        data.put_qubit_param("0", PARAM_QUBIT_FREQUENCY, 7.2);
        data.put_qubit_param("1", "t1", 25.0); // not a frequency

        let freqs = data.qubit_frequencies();
        assert_eq!(freqs.len(), 1);
        assert_relative_eq!(freqs["0"], 7.2);
    }

    #[test]
    fn test_merge_is_additive() {
        let mut a = CalibData::new();
        a.put_qubit_param("0", PARAM_QUBIT_FREQUENCY, 7.2);
        a.put_qubit_param("0", "t1", 20.0);

        let mut b = CalibData::new();
        b.put_qubit_param("0", "t1", 25.0);
        b.put_qubit_param("1", PARAM_QUBIT_FREQUENCY, 7.9);

        a.merge(&b);

        // Untouched key survives, overlapping key takes the newer value
        assert_relative_eq!(a.qubit_param("0", PARAM_QUBIT_FREQUENCY).unwrap(), 7.2);
        assert_relative_eq!(a.qubit_param("0", "t1").unwrap(), 25.0);
        assert_relative_eq!(a.qubit_param("1", PARAM_QUBIT_FREQUENCY).unwrap(), 7.9);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut data = CalibData::new();
        data.put_qubit_param("3", PARAM_QUBIT_FREQUENCY, 8.1);

        let json = serde_json::to_string(&data).unwrap();
        let back: CalibData = serde_json::from_str(&json).unwrap();
        assert_eq!(data, back);
    }
}
