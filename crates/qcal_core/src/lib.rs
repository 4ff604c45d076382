//! # QCAL Core
//!
//! Foundation types for the QCAL calibration orchestration engine:
//! chip topology, calibration targets, measured calibration data,
//! measurement result types, and the shared error taxonomy.
//!
//! ## Quick Start
//!
//! ```rust
//! use qcal_core::{ChipTopology, Target};
//!
//! let chip = ChipTopology::square_64();
//! let target = Target::AllMux { exclude_qids: vec![] };
//! let resolved = target.resolve(&chip).unwrap();
//! assert_eq!(resolved.qids.len(), 64);
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Error taxonomy
pub mod error;

/// Identifier and parameter-value types
pub mod types;

/// Chip topology (MUX layout + coupling map)
pub mod chip;

/// Calibration targets and resolution
pub mod target;

/// Measured calibration data
pub mod calib_data;

/// Measurement result types
pub mod measurement;

// ============================================================================
// Re-exports
// ============================================================================

pub use calib_data::{CalibData, PARAM_BELL_STATE_FIDELITY, PARAM_QUBIT_FREQUENCY};
pub use chip::{ChipTopology, Mux, MUX_SIZE};
pub use error::{QcalError, QcalResult};
pub use measurement::{Figure, OutputParameter, PostProcessResult, RawData, RunResult};
pub use target::{ResolvedTarget, Target};
pub use types::{
    coupling_id, split_coupling_id, BoxType, CouplingId, MuxId, ParameterValue, Qid,
};
