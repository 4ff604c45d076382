//! Execution document
//!
//! The persisted state of one calibration run: status, task results per
//! task manager, accumulated calibration data, and environment metadata.

use chrono::{DateTime, Utc};
use qcal_core::CalibData;
use qcal_tasks::TaskResultContainer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Execution lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not yet running
    Scheduled,
    /// Currently running
    Running,
    /// Finished successfully
    Completed,
    /// Finished with a fatal error
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Scheduled => "scheduled",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Persisted state of one calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Execution identifier
    pub execution_id: String,
    /// Lifecycle status
    pub status: ExecutionStatus,
    /// Task result containers, keyed by task manager id
    pub task_results: HashMap<String, TaskResultContainer>,
    /// Calibration data accumulated so far
    pub calib_data: CalibData,
    /// Controller environment snapshot
    pub controller_info: Value,
    /// Fridge environment snapshot
    pub fridge_info: Value,
    /// Free-form note
    pub note: String,
    /// Start timestamp
    pub start_at: Option<DateTime<Utc>>,
    /// End timestamp
    pub end_at: Option<DateTime<Utc>>,
    /// Elapsed wall time in seconds
    pub elapsed_time_s: Option<f64>,
    /// Last on-disk update
    pub updated_at: DateTime<Utc>,
    /// User tags
    pub tags: Vec<String>,
    /// Terminal status message
    pub message: String,
}

impl Execution {
    /// Create a freshly scheduled execution
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::Scheduled,
            task_results: HashMap::new(),
            calib_data: CalibData::new(),
            controller_info: Value::Null,
            fridge_info: Value::Null,
            note: String::new(),
            start_at: None,
            end_at: None,
            elapsed_time_s: None,
            updated_at: Utc::now(),
            tags: Vec::new(),
            message: String::new(),
        }
    }

    /// Create with a generated id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Mark running and stamp the start time
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.start_at = Some(Utc::now());
    }

    /// Mark completed and stamp end/elapsed
    pub fn complete(&mut self, message: impl Into<String>) {
        self.status = ExecutionStatus::Completed;
        self.message = message.into();
        self.stamp_end();
    }

    /// Mark failed and stamp end/elapsed
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.message = message.into();
        self.stamp_end();
    }

    fn stamp_end(&mut self) {
        let end = Utc::now();
        self.end_at = Some(end);
        if let Some(start) = self.start_at {
            self.elapsed_time_s = Some((end - start).num_milliseconds() as f64 / 1000.0);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut exec = Execution::generate();
        assert_eq!(exec.status, ExecutionStatus::Scheduled);

        exec.start();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.start_at.is_some());

        exec.complete("all targets calibrated");
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(exec.elapsed_time_s.unwrap() >= 0.0);
    }

    #[test]
    fn test_fail_records_message() {
        let mut exec = Execution::new("exec-1");
        exec.start();
        exec.fail("lock timeout");

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.message, "lock timeout");
    }

    #[test]
    fn test_serde_round_trip() {
        let exec = Execution::new("exec-1");
        let json = serde_json::to_string(&exec).unwrap();
        let back: Execution = serde_json::from_str(&json).unwrap();
        assert_eq!(exec, back);
    }
}
