//! Task registry
//!
//! Static registration table mapping task names to their definitions and
//! postprocess implementations. Built at startup by explicit `register`
//! calls; nothing here depends on load order.

use crate::task_result::TaskType;
use qcal_core::{PostProcessResult, Qid, QcalError, QcalResult, RunResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Static metadata for one task kind
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    /// Task name (registry key)
    pub name: &'static str,
    /// Entity kind the task operates on
    pub task_type: TaskType,
    /// MUX-level task: executed once per MUX, results fanned out
    pub mux_level: bool,
    /// Benchmarking family: fidelity outputs are bound-checked
    pub benchmark_family: bool,
    /// Per-task R² threshold; `None` takes the engine default
    pub r2_threshold: Option<f64>,
}

impl TaskDefinition {
    /// Plain qubit task
    pub const fn qubit(name: &'static str) -> Self {
        Self {
            name,
            task_type: TaskType::Qubit,
            mux_level: false,
            benchmark_family: false,
            r2_threshold: None,
        }
    }

    /// Coupling task
    pub const fn coupling(name: &'static str) -> Self {
        Self {
            name,
            task_type: TaskType::Coupling,
            mux_level: false,
            benchmark_family: false,
            r2_threshold: None,
        }
    }

    /// Mark as MUX-level (run once, distributed to siblings)
    pub const fn mux_level(mut self) -> Self {
        self.mux_level = true;
        self
    }

    /// Mark as benchmarking family (fidelity bound applies)
    pub const fn benchmark(mut self) -> Self {
        self.benchmark_family = true;
        self
    }

    /// Set a task-specific R² threshold
    pub const fn with_r2_threshold(mut self, threshold: f64) -> Self {
        self.r2_threshold = Some(threshold);
        self
    }
}

/// A calibration task: definition plus postprocess
///
/// `postprocess` turns one raw run result into that qid's committed
/// output; for MUX-level tasks it re-derives each sibling's slice of the
/// shared measurement.
pub trait CalibrationTask: Send + Sync {
    /// Static metadata
    fn definition(&self) -> &TaskDefinition;

    /// Derive one qid's output from a raw run result
    fn postprocess(&self, run: &RunResult, qid: &Qid) -> QcalResult<PostProcessResult>;
}

/// Name -> task table, built once at startup
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<&'static str, Arc<dyn CalibrationTask>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task; replaces any previous entry under the same name
    pub fn register(&mut self, task: Arc<dyn CalibrationTask>) -> &mut Self {
        self.tasks.insert(task.definition().name, task);
        self
    }

    /// Look up a task by name
    pub fn get(&self, name: &str) -> QcalResult<Arc<dyn CalibrationTask>> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| QcalError::UnknownTask(name.to_string()))
    }

    /// All registered definitions
    pub fn definitions(&self) -> Vec<&TaskDefinition> {
        self.tasks.values().map(|t| t.definition()).collect()
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
