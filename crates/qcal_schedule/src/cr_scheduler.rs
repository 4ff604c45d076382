//! Conflict-aware CR pair scheduler
//!
//! Turns a candidate qubit set into ordered, hardware-safe parallel
//! groups of control -> target pairs: enumerate valid couplings, run the
//! filter chain, then hand the survivors to a grouping strategy.

use crate::cr_pair::CrPair;
use crate::filter::{FilterContext, FrequencyDirectionalityFilter, PairFilter};
use crate::strategy::{GreedyColoringStrategy, GroupingStrategy, ScheduleContext};
use log::info;
use qcal_core::{CalibData, ChipTopology, Qid, QcalResult};

/// Conflict-aware pair scheduler
pub struct CrScheduler {
    filters: Vec<Box<dyn PairFilter>>,
    strategy: Box<dyn GroupingStrategy>,
}

impl CrScheduler {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create with an empty filter chain and the given strategy
    pub fn new(strategy: Box<dyn GroupingStrategy>) -> Self {
        Self {
            filters: Vec::new(),
            strategy,
        }
    }

    /// Default preset: frequency directionality + greedy coloring
    pub fn default_for_chip() -> Self {
        Self::new(Box::new(GreedyColoringStrategy))
            .with_filter(Box::new(FrequencyDirectionalityFilter::new()))
    }

    /// Append a filter to the chain (applied in insertion order)
    pub fn with_filter(mut self, filter: Box<dyn PairFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Replace the grouping strategy
    pub fn with_strategy(mut self, strategy: Box<dyn GroupingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Generate ordered parallel groups for the candidate qubits
    ///
    /// An empty candidate list yields an empty schedule; pairs lacking
    /// frequency data fall out of the filter chain rather than failing
    /// the call.
    pub fn generate(
        &self,
        chip: &ChipTopology,
        calib_data: &CalibData,
        candidates: &[Qid],
        max_parallel_ops: usize,
    ) -> QcalResult<Vec<Vec<CrPair>>> {
        let mut pairs = enumerate_pairs(chip, candidates);
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let qubit_frequency = calib_data.qubit_frequencies();
        let gate_fidelity = calib_data.gate_fidelities();
        let ctx = FilterContext {
            chip,
            qubit_frequency: &qubit_frequency,
            gate_fidelity: &gate_fidelity,
        };

        for filter in &self.filters {
            let before = pairs.len();
            pairs = filter.apply(pairs, &ctx);
            info!(
                "filter '{}': {} -> {} pairs",
                filter.name(),
                before,
                pairs.len()
            );
        }

        let schedule_ctx = ScheduleContext {
            qid_to_mux: chip.qid_to_mux(),
            max_parallel_ops,
        };
        let groups = self.strategy.schedule(pairs, &schedule_ctx)?;
        info!(
            "strategy '{}': {} parallel groups",
            self.strategy.name(),
            groups.len()
        );
        Ok(groups)
    }
}

/// Enumerate all ordered candidate pairs that are valid hardware couplings
fn enumerate_pairs(chip: &ChipTopology, candidates: &[Qid]) -> Vec<CrPair> {
    let mut pairs = Vec::new();
    for a in candidates {
        for b in candidates {
            if a != b && chip.is_coupling(a, b) {
                pairs.push(CrPair::new(a.clone(), b.clone()));
            }
        }
    }
    pairs
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CandidateQubitFilter, FidelityFilter};
    use crate::strategy::MuxAwareCompositeStrategy;
    use qcal_core::{ChipTopology, PARAM_BELL_STATE_FIDELITY, PARAM_QUBIT_FREQUENCY};

    fn freq_data(entries: &[(&str, f64)]) -> CalibData {
        let mut data = CalibData::new();
        for (qid, f) in entries {
            data.put_qubit_param(qid, PARAM_QUBIT_FREQUENCY, *f);
        }
        data
    }

    #[test]
    fn test_empty_candidates_empty_schedule() {
        let chip = ChipTopology::square_64();
        let scheduler = CrScheduler::default_for_chip();

        let groups = scheduler.generate(&chip, &CalibData::new(), &[], 4).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_enumerate_only_couplings() {
        let chip = ChipTopology::square_64();
        // 0-1 coupled, 0-9 not (diagonal)
        let pairs = enumerate_pairs(&chip, &["0".to_string(), "1".into(), "9".into()]);

        assert!(pairs.contains(&CrPair::new("0", "1")));
        assert!(pairs.contains(&CrPair::new("1", "0")));
        assert!(pairs.contains(&CrPair::new("1", "9")));
        assert!(!pairs.iter().any(|p| p.control == "0" && p.target == "9"));
    }

    #[test]
    fn test_generate_with_directionality() {
        let chip = ChipTopology::square_64();
        let data = freq_data(&[("0", 7.2), ("1", 7.9)]);
        let scheduler = CrScheduler::default_for_chip();

        let groups = scheduler
            .generate(&chip, &data, &["0".to_string(), "1".into()], 4)
            .unwrap();

        let all: Vec<&CrPair> = groups.iter().flatten().collect();
        assert_eq!(all, vec![&CrPair::new("0", "1")]);
    }

    #[test]
    fn test_unknown_frequency_pair_excluded_not_failed() {
        let chip = ChipTopology::square_64();
        // Only qubit 1 has a measured frequency; 9 is unmeasured, so the
        // design-parity fallback decides the direction and the call
        // succeeds rather than erroring.
        let data = freq_data(&[("1", 7.9)]);
        let scheduler = CrScheduler::default_for_chip();

        let result = scheduler.generate(&chip, &data, &["1".to_string(), "9".into()], 4);
        assert!(result.is_ok());
    }

    #[test]
    fn test_generate_respects_mux_conflicts_end_to_end() {
        // Candidates 0..3 where 0-1 and 2-3 are MUX-disjoint but the
        // cross pairs collide: place 0-1 and 2-3 together, never the
        // conflicting combinations.
        let chip = ChipTopology::square_64();
        let data = freq_data(&[("0", 7.0), ("1", 7.5), ("2", 7.1), ("3", 7.6)]);
        let scheduler = CrScheduler::default_for_chip();

        let candidates: Vec<Qid> = ["0", "1", "2", "3"].iter().map(|s| s.to_string()).collect();
        let groups = scheduler.generate(&chip, &data, &candidates, 2).unwrap();

        // Survivors after directionality: 0-1, 2-3, 2-1
        let qid_to_mux = chip.qid_to_mux();
        for group in &groups {
            for (i, a) in group.iter().enumerate() {
                for b in &group[i + 1..] {
                    let mux_a: Vec<_> = [&a.control, &a.target]
                        .iter()
                        .filter_map(|q| qid_to_mux.get(*q))
                        .collect();
                    let shares = [&b.control, &b.target]
                        .iter()
                        .filter_map(|q| qid_to_mux.get(*q))
                        .any(|m| mux_a.contains(&m));
                    assert!(!shares, "{} and {} share a MUX", a, b);
                }
            }
        }

        // 0-1 and 2-3 are MUX-disjoint and must share a group
        let together = groups.iter().any(|g| {
            g.contains(&CrPair::new("0", "1")) && g.contains(&CrPair::new("2", "3"))
        });
        assert!(together);
    }

    #[test]
    fn test_full_filter_chain() {
        let chip = ChipTopology::square_64();
        let mut data = freq_data(&[("0", 7.0), ("1", 7.5), ("2", 7.1), ("3", 7.6)]);
        data.put_coupling_param("0-1", PARAM_BELL_STATE_FIDELITY, 0.4);

        let scheduler = CrScheduler::new(Box::new(MuxAwareCompositeStrategy))
            .with_filter(Box::new(CandidateQubitFilter::new(
                ["0", "1", "2", "3"].iter().map(|s| s.to_string()),
            )))
            .with_filter(Box::new(FrequencyDirectionalityFilter::new()))
            .with_filter(Box::new(FidelityFilter::new(0.8)));

        let candidates: Vec<Qid> = ["0", "1", "2", "3"].iter().map(|s| s.to_string()).collect();
        let groups = scheduler.generate(&chip, &data, &candidates, 4).unwrap();

        let all: Vec<&CrPair> = groups.iter().flatten().collect();
        // 0-1 dropped by the fidelity filter
        assert!(!all.contains(&&CrPair::new("0", "1")));
        assert!(all.contains(&&CrPair::new("2", "3")));
    }
}
