//! Task result container
//!
//! Four partitions of task results, keyed as the task type demands.
//! Within one partition and one qid there is at most one active task per
//! name; `ensure_task_exists` is an idempotent lookup-or-create.

use crate::task_result::{TaskResult, TaskType};
use qcal_core::Qid;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-execution task result partitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResultContainer {
    /// Qubit tasks, keyed by qid
    pub qubit_tasks: HashMap<Qid, Vec<TaskResult>>,
    /// Coupling tasks, keyed by coupling id
    pub coupling_tasks: HashMap<Qid, Vec<TaskResult>>,
    /// Chip-global tasks
    pub global_tasks: Vec<TaskResult>,
    /// System-level tasks
    pub system_tasks: Vec<TaskResult>,
}

impl TaskResultContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent lookup-or-create for the active task under a key
    ///
    /// qid lists auto-initialize on first touch, so MUX fan-out can add
    /// entries out of normal creation order.
    pub fn ensure_task_exists(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
        upstream_id: &str,
    ) -> &mut TaskResult {
        let list = self.partition_mut(task_type, qid);

        if let Some(idx) = list.iter().position(|t| t.name == name && t.is_active()) {
            return &mut list[idx];
        }

        let task = TaskResult::new(name, task_type, qid).with_upstream(upstream_id);
        list.push(task);
        let last = list.len() - 1;
        &mut list[last]
    }

    /// The active task under a key, if any
    pub fn get_task_mut(
        &mut self,
        name: &str,
        task_type: TaskType,
        qid: &str,
    ) -> Option<&mut TaskResult> {
        self.partition_mut(task_type, qid)
            .iter_mut()
            .find(|t| t.name == name && t.is_active())
    }

    /// Read-only lookup of the most recent task under a key, active or not
    pub fn find_task(&self, name: &str, task_type: TaskType, qid: &str) -> Option<&TaskResult> {
        self.partition(task_type, qid)?
            .iter()
            .rev()
            .find(|t| t.name == name)
    }

    /// All task results across every partition
    pub fn all_tasks(&self) -> Vec<&TaskResult> {
        let mut tasks: Vec<&TaskResult> = Vec::new();
        for list in self.qubit_tasks.values() {
            tasks.extend(list.iter());
        }
        for list in self.coupling_tasks.values() {
            tasks.extend(list.iter());
        }
        tasks.extend(self.global_tasks.iter());
        tasks.extend(self.system_tasks.iter());
        tasks
    }

    fn partition(&self, task_type: TaskType, qid: &str) -> Option<&Vec<TaskResult>> {
        match task_type {
            TaskType::Qubit => self.qubit_tasks.get(qid),
            TaskType::Coupling => self.coupling_tasks.get(qid),
            TaskType::Global => Some(&self.global_tasks),
            TaskType::System => Some(&self.system_tasks),
        }
    }

    fn partition_mut(&mut self, task_type: TaskType, qid: &str) -> &mut Vec<TaskResult> {
        match task_type {
            TaskType::Qubit => self.qubit_tasks.entry(qid.to_string()).or_default(),
            TaskType::Coupling => self.coupling_tasks.entry(qid.to_string()).or_default(),
            TaskType::Global => &mut self.global_tasks,
            TaskType::System => &mut self.system_tasks,
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
    fn test_ensure_task_exists_idempotent() {
        let mut container = TaskResultContainer::new();

        let id_first = container
            .ensure_task_exists("rabi", TaskType::Qubit, "5", "")
            .task_id
            .clone();
        let id_second = container
            .ensure_task_exists("rabi", TaskType::Qubit, "5", "")
            .task_id
            .clone();

        assert_eq!(id_first, id_second);
        assert_eq!(container.qubit_tasks["5"].len(), 1);
    }

    #[test]
    fn test_distinct_keys_distinct_tasks() {
        let mut container = TaskResultContainer::new();

        let a = container
            .ensure_task_exists("rabi", TaskType::Qubit, "5", "")
            .task_id
            .clone();
        let b = container
            .ensure_task_exists("rabi", TaskType::Qubit, "6", "")
            .task_id
            .clone();
        let c = container
            .ensure_task_exists("ramsey", TaskType::Qubit, "5", "")
            .task_id
            .clone();

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(container.qubit_tasks["5"].len(), 2);
    }

    #[test]
    fn test_terminal_task_not_reused() {
        let mut container = TaskResultContainer::new();

        let first = container.ensure_task_exists("rabi", TaskType::Qubit, "5", "");
        first.start().unwrap();
        first.complete("done").unwrap();
        let first_id = first.task_id.clone();

        // A terminal task is no longer active; a fresh one is created
        let second = container.ensure_task_exists("rabi", TaskType::Qubit, "5", "");
        assert_ne!(second.task_id, first_id);
        assert_eq!(container.qubit_tasks["5"].len(), 2);
    }

    #[test]
    fn test_global_and_system_partitions() {
        let mut container = TaskResultContainer::new();

        container.ensure_task_exists("chip_report", TaskType::Global, "", "");
        container.ensure_task_exists("fridge_check", TaskType::System, "", "");

        assert_eq!(container.global_tasks.len(), 1);
        assert_eq!(container.system_tasks.len(), 1);
        assert!(container.qubit_tasks.is_empty());
    }

    #[test]
    fn test_find_task_sees_terminal_results() {
        let mut container = TaskResultContainer::new();

        let task = container.ensure_task_exists("rabi", TaskType::Qubit, "5", "");
        task.start().unwrap();
        task.fail("driver timeout").unwrap();

        let found = container.find_task("rabi", TaskType::Qubit, "5").unwrap();
        assert_eq!(found.message, "driver timeout");
        assert!(container.get_task_mut("rabi", TaskType::Qubit, "5").is_none());
    }

    #[test]
    fn test_all_tasks() {
        let mut container = TaskResultContainer::new();
        container.ensure_task_exists("rabi", TaskType::Qubit, "5", "");
        container.ensure_task_exists("zx90", TaskType::Coupling, "0-1", "");
        container.ensure_task_exists("chip_report", TaskType::Global, "", "");

        assert_eq!(container.all_tasks().len(), 3);
    }
}
