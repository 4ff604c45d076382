//! # QCAL Store
//!
//! Crash-safe, concurrency-safe persistence for the QCAL engine: the
//! per-run execution document (file lock + atomic rename) and the
//! shared calibration note (optimistic insert-or-merge with bounded
//! retries).
//!
//! ## Quick Start
//!
//! ```rust
//! use qcal_store::{Execution, ExecutionStore};
//! use std::time::Duration;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = ExecutionStore::new(dir.path(), Duration::from_secs(5));
//! store.create(&Execution::new("exec-1")).unwrap();
//! store.update(|exec| exec.start()).unwrap();
//! ```

#![warn(missing_docs)]

// ============================================================================
// Module Declarations
// ============================================================================

/// Execution document and lifecycle
pub mod execution;

/// File-locked execution persistence
pub mod execution_store;

/// Shared calibration note store
pub mod note;

// ============================================================================
// Re-exports
// ============================================================================

pub use execution::{Execution, ExecutionStatus};
pub use execution_store::{ExecutionStore, FileLock, EXECUTION_FILE};
pub use note::{
    upsert_with_retry, CalibrationNote, InMemoryNoteStore, NoteKey, NoteStore, RetryPolicy,
    MASTER_EXECUTION,
};
