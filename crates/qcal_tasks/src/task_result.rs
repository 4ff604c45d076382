//! Task result lifecycle
//!
//! A `TaskResult` tracks one measurement/analysis task for one entity
//! through its status transitions, input/output parameters, and artifact
//! paths. Transitions are one-directional; a completed or failed task is
//! never resurrected within one execution.

use chrono::{DateTime, Utc};
use qcal_core::{OutputParameter, ParameterValue, Qid, QcalError, QcalResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Status
// ============================================================================

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet started
    Scheduled,
    /// Currently executing
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Waiting on upstream data, set only by explicit external marking
    Pending,
}

impl TaskStatus {
    /// Check whether a transition to `next` is legal
    ///
    /// Scheduled -> Running -> {Completed, Failed}; Pending is reachable
    /// from Scheduled or Running and resumes through Running. Terminal
    /// states accept nothing.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Scheduled, Running)
                | (Scheduled, Pending)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Pending)
                | (Pending, Running)
        )
    }

    /// Check whether this is a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Pending => "pending",
        };
        write!(f, "{}", s)
    }
}

/// Entity kind a task operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Single-qubit task, keyed by qid
    Qubit,
    /// Coupling-pair task, keyed by coupling id
    Coupling,
    /// Chip-global task, no qid
    Global,
    /// System-level task, no qid
    System,
}

impl TaskType {
    /// Check whether results of this type are keyed by qid
    pub fn is_keyed(self) -> bool {
        matches!(self, TaskType::Qubit | TaskType::Coupling)
    }
}

// ============================================================================
// Task Result
// ============================================================================

/// One task's state for one entity within one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Unique task id
    pub task_id: String,
    /// Task name, unique per entity within one execution
    pub name: String,
    /// Id of the upstream task this one depends on
    pub upstream_id: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Human-readable status message
    pub message: String,
    /// Input parameters, resolved at definition time
    pub input_parameters: HashMap<String, ParameterValue>,
    /// Committed output parameters
    pub output_parameters: HashMap<String, OutputParameter>,
    /// Free-form note
    pub note: String,
    /// Persisted figure paths
    pub figure_paths: Vec<String>,
    /// Persisted raw-data paths
    pub raw_data_paths: Vec<String>,
    /// Start timestamp
    pub start_at: Option<DateTime<Utc>>,
    /// End timestamp
    pub end_at: Option<DateTime<Utc>>,
    /// Elapsed wall time in seconds
    pub elapsed_time_s: Option<f64>,
    /// Entity kind
    pub task_type: TaskType,
    /// Entity id (qid or coupling id); empty for global/system tasks
    pub qid: Qid,
}

impl TaskResult {
    /// Create a freshly scheduled task result
    pub fn new(name: impl Into<String>, task_type: TaskType, qid: impl Into<Qid>) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            name: name.into(),
            upstream_id: String::new(),
            status: TaskStatus::Scheduled,
            message: String::new(),
            input_parameters: HashMap::new(),
            output_parameters: HashMap::new(),
            note: String::new(),
            figure_paths: Vec::new(),
            raw_data_paths: Vec::new(),
            start_at: None,
            end_at: None,
            elapsed_time_s: None,
            task_type,
            qid: qid.into(),
        }
    }

    /// Set the upstream dependency
    pub fn with_upstream(mut self, upstream_id: impl Into<String>) -> Self {
        self.upstream_id = upstream_id.into();
        self
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn transition(&mut self, next: TaskStatus) -> QcalResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(QcalError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark running and stamp the start time
    pub fn start(&mut self) -> QcalResult<()> {
        self.transition(TaskStatus::Running)?;
        self.start_at = Some(Utc::now());
        Ok(())
    }

    /// Mark completed
    pub fn complete(&mut self, message: impl Into<String>) -> QcalResult<()> {
        self.transition(TaskStatus::Completed)?;
        self.message = message.into();
        Ok(())
    }

    /// Mark failed
    pub fn fail(&mut self, message: impl Into<String>) -> QcalResult<()> {
        self.transition(TaskStatus::Failed)?;
        self.message = message.into();
        Ok(())
    }

    /// Mark pending (awaiting upstream data)
    pub fn mark_pending(&mut self, message: impl Into<String>) -> QcalResult<()> {
        self.transition(TaskStatus::Pending)?;
        self.message = message.into();
        Ok(())
    }

    /// Stamp the end time and elapsed duration
    pub fn end(&mut self) {
        let end = Utc::now();
        self.end_at = Some(end);
        if let Some(start) = self.start_at {
            self.elapsed_time_s = Some((end - start).num_milliseconds() as f64 / 1000.0);
        }
    }

    // ========================================================================
    // Parameters and Artifacts
    // ========================================================================

    /// Replace the whole output-parameter map
    pub fn put_output_parameters(&mut self, params: HashMap<String, OutputParameter>) {
        self.output_parameters = params;
    }

    /// Atomically empty the output-parameter map (rollback)
    pub fn clear_output_parameters(&mut self) {
        self.output_parameters.clear();
    }

    /// Attach persisted figure paths
    pub fn set_figure_paths(&mut self, paths: Vec<String>) {
        self.figure_paths = paths;
    }

    /// Attach persisted raw-data paths
    pub fn set_raw_data_paths(&mut self, paths: Vec<String>) {
        self.raw_data_paths = paths;
    }

    /// A task is active until it reaches a terminal status
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use qcal_core::OutputParameter;

    #[test]
    fn test_new_task_is_scheduled() {
        let task = TaskResult::new("rabi", TaskType::Qubit, "5");
        assert_eq!(task.status, TaskStatus::Scheduled);
        assert!(task.is_active());
        assert!(!task.task_id.is_empty());
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut task = TaskResult::new("rabi", TaskType::Qubit, "5");

        task.start().unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.start_at.is_some());

        task.complete("fit converged").unwrap();
        task.end();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.end_at.is_some());
        assert!(task.elapsed_time_s.unwrap() >= 0.0);
        assert!(!task.is_active());
    }

    #[test]
    fn test_no_resurrection() {
        let mut task = TaskResult::new("rabi", TaskType::Qubit, "5");
        task.start().unwrap();
        task.fail("driver timeout").unwrap();

        assert!(matches!(
            task.start(),
            Err(QcalError::InvalidTransition { .. })
        ));
        assert!(task.complete("late").is_err());
    }

    #[test]
    fn test_cannot_complete_before_start() {
        let mut task = TaskResult::new("rabi", TaskType::Qubit, "5");
        assert!(task.complete("early").is_err());
    }

    #[test]
    fn test_pending_round_trip() {
        let mut task = TaskResult::new("zx90", TaskType::Coupling, "0-1");
        task.mark_pending("awaiting upstream frequency").unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        task.start().unwrap();
        task.complete("done").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_output_parameter_rollback() {
        let mut task = TaskResult::new("rabi", TaskType::Qubit, "5");
        let mut params = HashMap::new();
        params.insert(
            "rabi_frequency".to_string(),
            OutputParameter::new(2.1e7, "Hz"),
        );
        task.put_output_parameters(params);
        assert_eq!(task.output_parameters.len(), 1);

        task.clear_output_parameters();
        assert!(task.output_parameters.is_empty());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&TaskStatus::Scheduled).unwrap();
        assert_eq!(json, "\"scheduled\"");
    }
}
