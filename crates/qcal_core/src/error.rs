//! Error types for QCAL
//!
//! Comprehensive error handling for the calibration orchestration engine.

// Error variant fields are self-documenting via error messages
#![allow(missing_docs)]

use thiserror::Error;

/// Main error type for QCAL
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QcalError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Reported gate fidelity above the physical bound of 1.0
    #[error("Task '{task}' on qubit {qid} reported fidelity {fidelity}: must be <= 1.0")]
    FidelityOutOfRange {
        task: String,
        qid: String,
        fidelity: f64,
    },

    /// Curve-fit R² below the acceptance threshold
    #[error("Task '{task}' on qubit {qid}: R² {r2:.4} below threshold {threshold:.4}")]
    GoodnessOfFitBelowThreshold {
        task: String,
        qid: String,
        r2: f64,
        threshold: f64,
    },

    /// Invalid parameter value definition
    #[error("Invalid parameter value: {0}")]
    InvalidParameterValue(String),

    // ========================================================================
    // Scheduling Errors
    // ========================================================================
    /// No valid parallel grouping within the requested bound
    #[error("Conflict resolution failed: {0}")]
    ConflictResolution(String),

    /// MUX id not present on the chip
    #[error("MUX {0} not found on chip")]
    UnknownMux(usize),

    /// Qubit id not present on the chip
    #[error("Qubit '{0}' not found on chip")]
    UnknownQubit(String),

    /// Coupling id is not "<control>-<target>"
    #[error("Invalid coupling id '{0}': expected '<control>-<target>'")]
    InvalidCouplingId(String),

    // ========================================================================
    // Task State Errors
    // ========================================================================
    /// Task name not registered
    #[error("Task '{0}' is not registered")]
    UnknownTask(String),

    /// Task result not found for a (name, type, qid) key
    #[error("No task result for '{name}' ({qid})")]
    TaskNotFound { name: String, qid: String },

    /// Illegal task status transition
    #[error("Illegal task status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // ========================================================================
    // Concurrency Errors
    // ========================================================================
    /// File lock not acquired within the bounded wait
    #[error("Lock acquisition timed out after {waited_ms}ms on {path}")]
    LockTimeout { path: String, waited_ms: u64 },

    /// Optimistic upsert retries exhausted
    #[error("Upsert retries exhausted for '{key}' after {attempts} attempts")]
    RetryExhausted { key: String, attempts: u32 },

    /// Insert raced with another writer holding the same document key
    #[error("Duplicate document key: {0}")]
    DuplicateKey(String),

    // ========================================================================
    // Distribution Errors
    // ========================================================================
    /// MUX fan-out postprocess failure for one sibling qubit
    #[error("Sibling distribution failed for qubit {qid}: {reason}")]
    SiblingDistribution { qid: String, reason: String },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// Disk or document-store I/O failure during a durable save
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(String),

    /// File I/O error
    #[error("File error: {0}")]
    FileError(String),

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// Hardware backend failure
    #[error("Backend error: {0}")]
    BackendError(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for QCAL operations
pub type QcalResult<T> = Result<T, QcalError>;

// ============================================================================
// Error Conversion Helpers
// ============================================================================

impl From<serde_json::Error> for QcalError {
    fn from(err: serde_json::Error) -> Self {
        QcalError::JsonError(err.to_string())
    }
}

impl From<std::io::Error> for QcalError {
    fn from(err: std::io::Error) -> Self {
        QcalError::FileError(err.to_string())
    }
}

// ============================================================================
// Error Helpers
// ============================================================================

impl QcalError {
    /// Check if error is a validation error (local to one task/qid,
    /// recovered by rollback rather than aborting the schedule group)
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            QcalError::FidelityOutOfRange { .. }
                | QcalError::GoodnessOfFitBelowThreshold { .. }
                | QcalError::InvalidParameterValue(_)
        )
    }

    /// Check if error is fatal for the whole execution
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QcalError::LockTimeout { .. }
                | QcalError::RetryExhausted { .. }
                | QcalError::Persistence(_)
                | QcalError::FileError(_)
        )
    }

    /// Check if error is recovered locally and recorded in task state
    pub fn is_recoverable(&self) -> bool {
        self.is_validation_error() || matches!(self, QcalError::SiblingDistribution { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
