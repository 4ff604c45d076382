//! # QCAL Engine
//!
//! Calibration flow orchestration: the result pipeline with its
//! validation gates, the MUX result distributor, repository seams, the
//! hardware backend interface, and the flow executor that drives a full
//! run against a chip.
//!
//! ## Quick Start
//!
//! ```rust
//! use qcal_engine::{CalibrationFlow, EngineConfig, SimulatedBackend};
//! use qcal_core::{ChipTopology, Target};
//! use qcal_tasks::TaskRegistry;
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let flow = CalibrationFlow::new(
//!     ChipTopology::square_64(),
//!     Arc::new(TaskRegistry::new()),
//!     EngineConfig::new(dir.path()),
//!     Arc::new(SimulatedBackend::new()),
//! )
//! .unwrap();
//!
//! let execution = flow.run(&Target::AllMux { exclude_qids: vec![] }, &[]).unwrap();
//! assert_eq!(execution.status, qcal_store::ExecutionStatus::Completed);
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Engine configuration
pub mod config;

/// Hardware backend interface
pub mod backend;

/// Repository seams and artifact persistence
pub mod repository;

/// Result validation and commit pipeline
pub mod pipeline;

/// MUX-level result fan-out
pub mod distributor;

/// Flow executor
pub mod executor;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{HardwareBackend, SimulatedBackend};
pub use config::{EngineConfig, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_R2_THRESHOLD};
pub use distributor::{DistributionOutcome, MuxResultDistributor};
pub use executor::CalibrationFlow;
pub use pipeline::{NoteWriter, ResultPipeline};
pub use repository::{
    CalibDataSaver, ChipHistoryRepository, ChipRepository, ExecutionRepository,
    FileCalibDataSaver, TaskResultHistoryRepository,
};
