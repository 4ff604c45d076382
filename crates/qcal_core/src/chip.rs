//! Chip topology for QCAL
//!
//! Describes the physical layout the schedulers reason about: qubits in
//! their MUX readout groups, qubit-qubit couplings, control-box wiring,
//! and the design-frequency checkerboard used before any measurement
//! exists.

use crate::error::{QcalError, QcalResult};
use crate::types::{coupling_id, BoxType, CouplingId, MuxId, Qid};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Number of qubits sharing one readout MUX
pub const MUX_SIZE: usize = 4;

/// One readout multiplexing group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mux {
    /// MUX identifier
    pub id: MuxId,
    /// Member qubits, position 0 is the representative
    pub qids: [Qid; MUX_SIZE],
}

impl Mux {
    /// Position of a qubit inside this MUX
    pub fn position_of(&self, qid: &str) -> Option<usize> {
        self.qids.iter().position(|q| q == qid)
    }
}

/// Chip topology (MUX layout + coupling map)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipTopology {
    /// Chip identifier
    chip_id: String,

    /// Number of columns in the qubit grid (qid = row * cols + col)
    grid_cols: usize,

    /// Readout MUX groups
    muxes: Vec<Mux>,

    /// Physical qubit-qubit couplings, stored once per undirected edge
    couplings: Vec<(Qid, Qid)>,

    /// Control-box type per MUX
    box_types: HashMap<MuxId, BoxType>,

    /// Explicitly declared control->target directions
    topology_directions: HashSet<CouplingId>,
}

impl ChipTopology {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Create a topology from explicit parts
    pub fn new(
        chip_id: impl Into<String>,
        grid_cols: usize,
        muxes: Vec<Mux>,
        couplings: Vec<(Qid, Qid)>,
        box_types: HashMap<MuxId, BoxType>,
        topology_directions: HashSet<CouplingId>,
    ) -> QcalResult<Self> {
        let mut seen = HashSet::new();
        for mux in &muxes {
            for qid in &mux.qids {
                if !seen.insert(qid.clone()) {
                    return Err(QcalError::InternalError(format!(
                        "qubit '{}' assigned to more than one MUX",
                        qid
                    )));
                }
            }
        }

        for (a, b) in &couplings {
            if a == b {
                return Err(QcalError::InvalidCouplingId(coupling_id(a, b)));
            }
        }

        Ok(Self {
            chip_id: chip_id.into(),
            grid_cols,
            muxes,
            couplings,
            box_types,
            topology_directions,
        })
    }

    /// Canned 64-qubit square-lattice chip (for tests and demos)
    ///
    /// 8x8 qubit grid, 16 MUXes of 2x2 blocks, nearest-neighbor couplings,
    /// A/B boxes alternating by MUX row.
    pub fn square_64() -> Self {
        const ROWS: usize = 8;
        const COLS: usize = 8;
        let mux_cols = COLS / 2;

        let mut muxes = Vec::new();
        let mut box_types = HashMap::new();
        for mux_row in 0..ROWS / 2 {
            for mux_col in 0..mux_cols {
                let id = mux_row * mux_cols + mux_col;
                let base_row = mux_row * 2;
                let base_col = mux_col * 2;
                let q = |dr: usize, dc: usize| ((base_row + dr) * COLS + base_col + dc).to_string();
                muxes.push(Mux {
                    id,
                    qids: [q(0, 0), q(0, 1), q(1, 0), q(1, 1)],
                });
                let box_type = if mux_row % 2 == 0 { BoxType::A } else { BoxType::B };
                box_types.insert(id, box_type);
            }
        }

        let mut couplings = Vec::new();
        for r in 0..ROWS {
            for c in 0..COLS {
                let q = r * COLS + c;
                if c + 1 < COLS {
                    couplings.push((q.to_string(), (q + 1).to_string()));
                }
                if r + 1 < ROWS {
                    couplings.push((q.to_string(), (q + COLS).to_string()));
                }
            }
        }

        Self {
            chip_id: "square_64".to_string(),
            grid_cols: COLS,
            muxes,
            couplings,
            box_types,
            topology_directions: HashSet::new(),
        }
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Chip identifier
    pub fn chip_id(&self) -> &str {
        &self.chip_id
    }

    /// All MUX groups
    pub fn muxes(&self) -> &[Mux] {
        &self.muxes
    }

    /// All MUX ids, sorted
    pub fn mux_ids(&self) -> BTreeSet<MuxId> {
        self.muxes.iter().map(|m| m.id).collect()
    }

    /// All qubit ids in MUX order
    pub fn all_qids(&self) -> Vec<Qid> {
        self.muxes
            .iter()
            .flat_map(|m| m.qids.iter().cloned())
            .collect()
    }

    /// Physical coupling map
    pub fn couplings(&self) -> &[(Qid, Qid)] {
        &self.couplings
    }

    // ========================================================================
    // MUX Queries
    // ========================================================================

    /// Look up a MUX by id
    pub fn mux(&self, mux_id: MuxId) -> QcalResult<&Mux> {
        self.muxes
            .iter()
            .find(|m| m.id == mux_id)
            .ok_or(QcalError::UnknownMux(mux_id))
    }

    /// Member qubits of a MUX
    pub fn mux_qubits(&self, mux_id: MuxId) -> QcalResult<&[Qid; MUX_SIZE]> {
        Ok(&self.mux(mux_id)?.qids)
    }

    /// Representative qubit of a MUX (position 0)
    pub fn representative_qid(&self, mux_id: MuxId) -> QcalResult<&Qid> {
        Ok(&self.mux(mux_id)?.qids[0])
    }

    /// MUX containing a qubit
    pub fn mux_of(&self, qid: &str) -> Option<MuxId> {
        self.muxes
            .iter()
            .find(|m| m.qids.iter().any(|q| q == qid))
            .map(|m| m.id)
    }

    /// Position of a qubit within its MUX
    pub fn position_in_mux(&self, qid: &str) -> Option<usize> {
        self.muxes.iter().find_map(|m| m.position_of(qid))
    }

    /// Build the qid -> MUX id map
    pub fn qid_to_mux(&self) -> HashMap<Qid, MuxId> {
        let mut map = HashMap::new();
        for mux in &self.muxes {
            for qid in &mux.qids {
                map.insert(qid.clone(), mux.id);
            }
        }
        map
    }

    /// Control-box type of a MUX (Mixed when undeclared)
    pub fn box_type_of_mux(&self, mux_id: MuxId) -> BoxType {
        self.box_types.get(&mux_id).copied().unwrap_or(BoxType::Mixed)
    }

    // ========================================================================
    // Coupling Queries
    // ========================================================================

    /// Check whether two qubits are physically coupled (either direction)
    pub fn is_coupling(&self, a: &str, b: &str) -> bool {
        self.couplings
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    /// Explicitly declared direction for a coupling
    ///
    /// Returns `Some(true)` when `a -> b` is declared, `Some(false)` when
    /// `b -> a` is declared, `None` when the topology is silent.
    pub fn declared_direction(&self, a: &str, b: &str) -> Option<bool> {
        if self.topology_directions.contains(&coupling_id(a, b)) {
            Some(true)
        } else if self.topology_directions.contains(&coupling_id(b, a)) {
            Some(false)
        } else {
            None
        }
    }

    // ========================================================================
    // Design Frequency Inference
    // ========================================================================

    /// Grid position of a numerically labeled qubit
    pub fn grid_position(&self, qid: &str) -> Option<(usize, usize)> {
        if self.grid_cols == 0 {
            return None;
        }
        let n: usize = qid.parse().ok()?;
        Some((n / self.grid_cols, n % self.grid_cols))
    }

    /// Checkerboard design parity: `true` marks the low-frequency side
    ///
    /// Fabrication alternates qubit design frequencies over the grid, so
    /// before any measurement exists the (row + col) parity predicts which
    /// endpoint of a coupling sits lower.
    pub fn design_parity(&self, qid: &str) -> Option<bool> {
        let (row, col) = self.grid_position(qid)?;
        Some((row + col) % 2 == 0)
    }
}

impl fmt::Display for ChipTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChipTopology({}, {} qubits, {} muxes, {} couplings)",
            self.chip_id,
            self.all_qids().len(),
            self.muxes.len(),
            self.couplings.len()
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
