//! # QCAL Tasks
//!
//! Task-result state machine for one execution: per-entity task results
//! with one-directional status transitions, the four-partition result
//! container, the in-memory task state manager, and the static task
//! registry.
//!
//! ## Quick Start
//!
//! ```rust
//! use qcal_tasks::{TaskManager, TaskType};
//!
//! let mut manager = TaskManager::new();
//! manager.ensure_task_exists("rabi", TaskType::Qubit, "5", "");
//! manager.start_task("rabi", TaskType::Qubit, "5").unwrap();
//! manager
//!     .update_task_status_to_completed("rabi", TaskType::Qubit, "5", "fit converged")
//!     .unwrap();
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Task result and status transitions
pub mod task_result;

/// Four-partition task result container
pub mod container;

/// Per-execution task state manager
pub mod manager;

/// Static task registry
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use container::TaskResultContainer;
pub use manager::TaskManager;
pub use registry::{CalibrationTask, TaskDefinition, TaskRegistry};
pub use task_result::{TaskResult, TaskStatus, TaskType};
