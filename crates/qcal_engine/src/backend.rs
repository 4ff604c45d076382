//! Hardware backend interface
//!
//! The physics driver is an opaque collaborator: the engine hands it a
//! task name plus resolved input parameters and gets back a raw run
//! result. No wire protocol is assumed.

use log::info;
use qcal_core::{ParameterValue, Qid, QcalError, QcalResult, RunResult};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Opaque hardware/physics driver
pub trait HardwareBackend: Send + Sync {
    /// Establish the instrument connection
    fn connect(&self) -> QcalResult<()>;

    /// Run one task for one qid and return the raw result
    fn run(
        &self,
        task_name: &str,
        input_parameters: &HashMap<String, ParameterValue>,
        qid: &Qid,
    ) -> QcalResult<RunResult>;

    /// Current instrument-parameter snapshot
    fn note(&self) -> QcalResult<Map<String, Value>>;

    /// Persist the instrument snapshot under an execution id
    ///
    /// Runs after every task, including after a validation failure, so
    /// the instrument state that produced the result is never lost.
    fn save_note(&self, execution_id: &str) -> QcalResult<()>;
}

// ============================================================================
// Simulated Backend
// ============================================================================

/// Scripted in-memory backend
///
/// Results are queued per (task, qid); a missing script entry yields an
/// empty result. Failures are injected per (task, qid) to exercise
/// error paths. Saved note snapshots are recorded for assertions.
#[derive(Default)]
pub struct SimulatedBackend {
    scripted: Mutex<HashMap<(String, Qid), VecDeque<RunResult>>>,
    failures: Mutex<HashMap<(String, Qid), String>>,
    note: Mutex<Map<String, Value>>,
    saved_notes: Mutex<Vec<String>>,
}

impl SimulatedBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for one (task, qid)
    pub fn script(&self, task_name: &str, qid: &str, result: RunResult) {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((task_name.to_string(), qid.to_string()))
            .or_default()
            .push_back(result);
    }

    /// Inject a backend failure for one (task, qid)
    pub fn inject_failure(&self, task_name: &str, qid: &str, reason: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((task_name.to_string(), qid.to_string()), reason.to_string());
    }

    /// Set an instrument-parameter entry
    pub fn put_note_field(&self, key: &str, value: Value) {
        self.note
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
    }

    /// Execution ids passed to `save_note`, in call order
    pub fn saved_notes(&self) -> Vec<String> {
        self.saved_notes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl HardwareBackend for SimulatedBackend {
    fn connect(&self) -> QcalResult<()> {
        Ok(())
    }

    fn run(
        &self,
        task_name: &str,
        _input_parameters: &HashMap<String, ParameterValue>,
        qid: &Qid,
    ) -> QcalResult<RunResult> {
        let key = (task_name.to_string(), qid.clone());

        if let Some(reason) = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Err(QcalError::BackendError(reason.clone()));
        }

        let result = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&key)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| RunResult::new(Value::Null));
        Ok(result)
    }

    fn note(&self) -> QcalResult<Map<String, Value>> {
        Ok(self.note.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save_note(&self, execution_id: &str) -> QcalResult<()> {
        info!("saving instrument note for execution {}", execution_id);
        self.saved_notes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(execution_id.to_string());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
