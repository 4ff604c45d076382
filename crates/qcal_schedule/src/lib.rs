//! # QCAL Schedule
//!
//! Conflict-aware schedulers that turn candidate qubits and coupling
//! pairs into ordered, hardware-safe parallel execution groups.
//!
//! Two schedulers live here:
//!
//! - [`CrScheduler`]: filters candidate control -> target pairs through a
//!   pluggable chain, then colors the MUX conflict graph into parallel
//!   groups.
//! - [`MuxScheduler`]: groups single-qubit operations into box-type
//!   stages, or into the synchronized 4-step checkerboard that runs one
//!   qubit per MUX per step.
//!
//! ## Quick Start
//!
//! ```rust
//! use qcal_core::{CalibData, ChipTopology, PARAM_QUBIT_FREQUENCY};
//! use qcal_schedule::CrScheduler;
//!
//! let chip = ChipTopology::square_64();
//! let mut data = CalibData::new();
//! data.put_qubit_param("0", PARAM_QUBIT_FREQUENCY, 7.2);
//! data.put_qubit_param("1", PARAM_QUBIT_FREQUENCY, 7.9);
//!
//! let scheduler = CrScheduler::default_for_chip();
//! let groups = scheduler
//!     .generate(&chip, &data, &["0".to_string(), "1".to_string()], 4)
//!     .unwrap();
//! assert_eq!(groups.len(), 1);
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Cross-resonance pair type
pub mod cr_pair;

/// Pluggable pair filters
pub mod filter;

/// Pluggable grouping strategies
pub mod strategy;

/// Conflict-aware pair scheduler
pub mod cr_scheduler;

/// MUX/box scheduler for single-qubit operations
pub mod mux_scheduler;

// ============================================================================
// Re-exports
// ============================================================================

pub use cr_pair::CrPair;
pub use cr_scheduler::CrScheduler;
pub use filter::{
    CandidateQubitFilter, FidelityFilter, FilterContext, FrequencyDirectionalityFilter, PairFilter,
};
pub use mux_scheduler::{MuxScheduler, ScheduleResult, ScheduleStage, SynchronizedStep};
pub use strategy::{
    GreedyColoringStrategy, GroupingStrategy, MuxAwareCompositeStrategy, ScheduleContext,
};
