//! Task state manager
//!
//! In-memory registry of task results for one execution, keyed by
//! (name, task type, qid). Owned by exactly one worker; never shared
//! across process boundaries.

use crate::container::TaskResultContainer;
use crate::task_result::{TaskResult, TaskType};
use log::debug;
use qcal_core::{OutputParameter, QcalError, QcalResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-execution task state manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskManager {
    /// Manager id, keys this manager's container in the execution document
    pub id: String,
    /// Task result partitions
    pub container: TaskResultContainer,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    /// Create an empty manager with a fresh id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            container: TaskResultContainer::new(),
        }
    }

    // ========================================================================
    // Task Creation and Lookup
    // ========================================================================

    /// Idempotent lookup-or-create; returns the task id
    pub fn ensure_task_exists(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
        upstream_id: &str,
    ) -> String {
        self.container
            .ensure_task_exists(name, task_type, qid, upstream_id)
            .task_id
            .clone()
    }

    /// Read the most recent task under a key
    pub fn get_task(&self, name: &str, task_type: TaskType, qid: &str) -> Option<&TaskResult> {
        self.container.find_task(name, task_type, qid)
    }

    /// Status message of the most recent task under a key
    pub fn task_message(&self, name: &str, task_type: TaskType, qid: &str) -> Option<&str> {
        self.get_task(name, task_type, qid).map(|t| t.message.as_str())
    }

    // ========================================================================
    // Status Transitions
    // ========================================================================

    /// Transition a task to running
    pub fn start_task(&mut self, name: &str, task_type: TaskType, qid: &str) -> QcalResult<()> {
        debug!("start task '{}' ({})", name, qid);
        self.active_task(name, task_type, qid)?.start()
    }

    /// Transition a task to completed
    pub fn update_task_status_to_completed(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
        message: &str,
    ) -> QcalResult<()> {
        debug!("complete task '{}' ({}): {}", name, qid, message);
        self.active_task(name, task_type, qid)?.complete(message)
    }

    /// Transition a task to failed
    pub fn update_task_status_to_failed(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
        message: &str,
    ) -> QcalResult<()> {
        debug!("fail task '{}' ({}): {}", name, qid, message);
        self.active_task(name, task_type, qid)?.fail(message)
    }

    /// Transition a task to pending (awaiting upstream data)
    pub fn update_task_status_to_pending(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
        message: &str,
    ) -> QcalResult<()> {
        self.active_task(name, task_type, qid)?.mark_pending(message)
    }

    /// Stamp end time and elapsed duration on the most recent task
    ///
    /// Works on terminal tasks too: `end_task` runs after complete/fail.
    pub fn end_task(&mut self, name: &str, task_type: TaskType, qid: &str) -> QcalResult<()> {
        self.recent_task(name, task_type, qid)?.end();
        Ok(())
    }

    // ========================================================================
    // Parameters and Artifacts
    // ========================================================================

    /// Bulk-replace a task's output parameters
    pub fn put_output_parameters(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
        params: HashMap<String, OutputParameter>,
    ) -> QcalResult<()> {
        self.recent_task(name, task_type, qid)?
            .put_output_parameters(params);
        Ok(())
    }

    /// Atomically empty a task's output parameters (rollback)
    pub fn clear_output_parameters(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
    ) -> QcalResult<()> {
        self.recent_task(name, task_type, qid)?.clear_output_parameters();
        Ok(())
    }

    /// Attach figure paths post-hoc
    pub fn set_figure_paths(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
        paths: Vec<String>,
    ) -> QcalResult<()> {
        self.recent_task(name, task_type, qid)?.set_figure_paths(paths);
        Ok(())
    }

    /// Attach raw-data paths post-hoc
    pub fn set_raw_data_paths(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
        paths: Vec<String>,
    ) -> QcalResult<()> {
        self.recent_task(name, task_type, qid)?.set_raw_data_paths(paths);
        Ok(())
    }

    // ========================================================================
    // Internal Lookup
    // ========================================================================

    fn active_task(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
    ) -> QcalResult<&mut TaskResult> {
        self.container
            .get_task_mut(name, task_type, qid)
            .ok_or_else(|| QcalError::TaskNotFound {
                name: name.to_string(),
                qid: qid.to_string(),
            })
    }

    /// Most recent task under a key regardless of status
    fn recent_task(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
    ) -> QcalResult<&mut TaskResult> {
        let list = match task_type {
            TaskType::Qubit => self.container.qubit_tasks.get_mut(qid),
            TaskType::Coupling => self.container.coupling_tasks.get_mut(qid),
            TaskType::Global => Some(&mut self.container.global_tasks),
            TaskType::System => Some(&mut self.container.system_tasks),
        };
        list.and_then(|l| l.iter_mut().rev().find(|t| t.name == name))
            .ok_or_else(|| QcalError::TaskNotFound {
                name: name.to_string(),
                qid: qid.to_string(),
            })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_result::TaskStatus;

    #[test]
    fn test_ensure_then_start() {
        let mut manager = TaskManager::new();

        let id = manager.ensure_task_exists("rabi", TaskType::Qubit, "5", "");
        manager.start_task("rabi", TaskType::Qubit, "5").unwrap();

        let task = manager.get_task("rabi", TaskType::Qubit, "5").unwrap();
        assert_eq!(task.task_id, id);
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[test]
    fn test_start_unknown_task() {
        let mut manager = TaskManager::new();
        let err = manager.start_task("rabi", TaskType::Qubit, "5").unwrap_err();
        assert!(matches!(err, QcalError::TaskNotFound { .. }));
    }

    #[test]
    fn test_illegal_transition_surfaces() {
        let mut manager = TaskManager::new();
        manager.ensure_task_exists("rabi", TaskType::Qubit, "5", "");

        // Completed before started
        let err = manager
            .update_task_status_to_completed("rabi", TaskType::Qubit, "5", "done")
            .unwrap_err();
        assert!(matches!(err, QcalError::InvalidTransition { .. }));
    }

    #[test]
    fn test_full_lifecycle_with_end() {
        let mut manager = TaskManager::new();
        manager.ensure_task_exists("rabi", TaskType::Qubit, "5", "");
        manager.start_task("rabi", TaskType::Qubit, "5").unwrap();
        manager
            .update_task_status_to_completed("rabi", TaskType::Qubit, "5", "fit converged")
            .unwrap();
        // end_task still works on the now-terminal task
        manager.end_task("rabi", TaskType::Qubit, "5").unwrap();

        let task = manager.get_task("rabi", TaskType::Qubit, "5").unwrap();
        assert!(task.end_at.is_some());
        assert_eq!(
            manager.task_message("rabi", TaskType::Qubit, "5"),
            Some("fit converged")
        );
    }

    #[test]
    fn test_output_parameters_round_trip() {
        let mut manager = TaskManager::new();
        manager.ensure_task_exists("rabi", TaskType::Qubit, "5", "");

        let mut params = HashMap::new();
        params.insert(
            "rabi_frequency".to_string(),
            OutputParameter::new(2.1e7, "Hz"),
        );
        manager
            .put_output_parameters("rabi", TaskType::Qubit, "5", params)
            .unwrap();
        assert_eq!(
            manager
                .get_task("rabi", TaskType::Qubit, "5")
                .unwrap()
                .output_parameters
                .len(),
            1
        );

        manager
            .clear_output_parameters("rabi", TaskType::Qubit, "5")
            .unwrap();
        assert!(manager
            .get_task("rabi", TaskType::Qubit, "5")
            .unwrap()
            .output_parameters
            .is_empty());
    }

    #[test]
    fn test_artifact_paths() {
        let mut manager = TaskManager::new();
        manager.ensure_task_exists("rabi", TaskType::Qubit, "5", "");

        manager
            .set_figure_paths(
                "rabi",
                TaskType::Qubit,
                "5",
                vec!["fig/rabi_5_0.png".to_string()],
            )
            .unwrap();
        manager
            .set_raw_data_paths(
                "rabi",
                TaskType::Qubit,
                "5",
                vec!["raw_data/rabi_5_raw_0.csv".to_string()],
            )
            .unwrap();

        let task = manager.get_task("rabi", TaskType::Qubit, "5").unwrap();
        assert_eq!(task.figure_paths.len(), 1);
        assert_eq!(task.raw_data_paths.len(), 1);
    }
}
