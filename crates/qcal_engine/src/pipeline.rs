//! Result pipeline
//!
//! Validates and commits one task run's post-processed output, in
//! strict order: fidelity bound, parameter commit, artifact
//! persistence, R² gate with selective rollback, backend note save plus
//! the calibration-note upsert. The note save runs even when a
//! validation gate failed, so the instrument state behind every result
//! is preserved.

use crate::backend::HardwareBackend;
use crate::repository::CalibDataSaver;
use log::{debug, warn};
use qcal_core::{CalibData, PostProcessResult, Qid, QcalError, QcalResult, RunResult};
use qcal_store::{upsert_with_retry, NoteKey, NoteStore, RetryPolicy};
use qcal_tasks::{TaskDefinition, TaskManager, TaskType};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Note Writer
// ============================================================================

/// Persists the backend's instrument snapshot as a calibration note
///
/// After every run the backend's current parameter snapshot is upserted
/// under (project, chip, execution, task), through the bounded-retry
/// insert-or-merge loop, so concurrent workers writing disjoint
/// parameters compose into one document.
pub struct NoteWriter {
    store: Arc<dyn NoteStore>,
    policy: RetryPolicy,
    project: String,
    chip_id: String,
}

impl NoteWriter {
    /// Create a writer for one (project, chip)
    pub fn new(
        store: Arc<dyn NoteStore>,
        policy: RetryPolicy,
        project: impl Into<String>,
        chip_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            policy,
            project: project.into(),
            chip_id: chip_id.into(),
        }
    }

    /// Snapshot the backend's note and upsert it under the task's key
    ///
    /// An empty snapshot writes nothing.
    pub fn record(
        &self,
        backend: &dyn HardwareBackend,
        execution_id: &str,
        task_name: &str,
    ) -> QcalResult<()> {
        let fields = backend.note()?;
        if fields.is_empty() {
            return Ok(());
        }
        let key = NoteKey::new(&self.project, &self.chip_id, execution_id, task_name);
        upsert_with_retry(self.store.as_ref(), &key, &fields, &self.policy)
    }
}

/// Commits task output through the validation gates
pub struct ResultPipeline {
    saver: Arc<dyn CalibDataSaver>,
    backend: Arc<dyn HardwareBackend>,
    notes: NoteWriter,
    default_r2_threshold: f64,
}

impl ResultPipeline {
    /// Create a pipeline with the engine-wide R² default
    pub fn new(
        saver: Arc<dyn CalibDataSaver>,
        backend: Arc<dyn HardwareBackend>,
        notes: NoteWriter,
        default_r2_threshold: f64,
    ) -> Self {
        Self {
            saver,
            backend,
            notes,
            default_r2_threshold,
        }
    }

    /// Validate and commit one run's output for one qid
    ///
    /// Returns `Ok(true)` when parameters were committed, `Ok(false)`
    /// when the result carried nothing to commit, and the held
    /// validation error after rollback. Artifacts survive an R²
    /// rollback; a fidelity violation fails before any state mutation.
    pub fn process(
        &self,
        manager: &mut TaskManager,
        calib_data: &mut CalibData,
        execution_id: &str,
        definition: &TaskDefinition,
        post: &PostProcessResult,
        qid: &Qid,
        run_result: &RunResult,
    ) -> QcalResult<bool> {
        let name = definition.name;
        let task_type = definition.task_type;

        // 1. Fidelity bound for benchmarking tasks
        let mut held: Option<QcalError> = None;
        if definition.benchmark_family {
            if let Some(err) = self.fidelity_violation(definition, post, qid) {
                held = Some(err);
            }
        }

        let mut committed = false;
        if held.is_none() {
            // 2. Parameter commit, stamped with provenance
            if !post.output_parameters.is_empty() {
                let task_id = manager
                    .get_task(name, task_type, qid)
                    .map(|t| t.task_id.clone())
                    .ok_or_else(|| QcalError::TaskNotFound {
                        name: name.to_string(),
                        qid: qid.clone(),
                    })?;

                let mut params = post.output_parameters.clone();
                for param in params.values_mut() {
                    param.execution_id = Some(execution_id.to_string());
                    param.task_id = Some(task_id.clone());
                }
                manager.put_output_parameters(name, task_type, qid, params)?;
                committed = true;
            }

            // 3. Artifact persistence; paths recorded on the task
            if !post.figures.is_empty() {
                let paths = self.saver.save_figures(name, qid, &post.figures)?;
                manager.set_figure_paths(name, task_type, qid, paths)?;
            }
            if !post.raw_data.is_empty() {
                let paths = self.saver.save_raw_data(name, qid, &post.raw_data)?;
                manager.set_raw_data_paths(name, task_type, qid, paths)?;
            }

            // 4. R² gate; rollback keeps the artifacts
            if let Some(r2) = run_result.r2_for(qid) {
                let threshold = definition.r2_threshold.unwrap_or(self.default_r2_threshold);
                if r2 < threshold {
                    warn!(
                        "task '{}' ({}): R² {:.4} below {:.4}, rolling back outputs",
                        name, qid, r2, threshold
                    );
                    manager.clear_output_parameters(name, task_type, qid)?;
                    committed = false;
                    held = Some(QcalError::GoodnessOfFitBelowThreshold {
                        task: name.to_string(),
                        qid: qid.clone(),
                        r2,
                        threshold,
                    });
                }
            }

            // Committed values become visible to downstream schedulers
            if committed {
                Self::mirror_into_calib_data(calib_data, task_type, qid, post);
            }
        }

        // 5. Instrument note save runs regardless of gate outcome
        self.backend.save_note(execution_id)?;
        self.notes.record(self.backend.as_ref(), execution_id, name)?;

        match held {
            Some(err) => Err(err),
            None => {
                debug!("task '{}' ({}) committed={}", name, qid, committed);
                Ok(committed)
            }
        }
    }

    fn fidelity_violation(
        &self,
        definition: &TaskDefinition,
        post: &PostProcessResult,
        qid: &Qid,
    ) -> Option<QcalError> {
        post.output_parameters
            .iter()
            .find(|(key, param)| key.contains("fidelity") && param.value > 1.0)
            .map(|(_, param)| QcalError::FidelityOutOfRange {
                task: definition.name.to_string(),
                qid: qid.clone(),
                fidelity: param.value,
            })
    }

    fn mirror_into_calib_data(
        calib_data: &mut CalibData,
        task_type: TaskType,
        qid: &Qid,
        post: &PostProcessResult,
    ) {
        for (key, param) in &post.output_parameters {
            match task_type {
                TaskType::Qubit => calib_data.put_qubit_param(qid, key, param.value),
                TaskType::Coupling => calib_data.put_coupling_param(qid, key, param.value),
                // Global/system outputs carry no per-entity calib entry
                TaskType::Global | TaskType::System => {}
            }
        }
    }
}

/// Stamp provenance onto a parameter map without a pipeline instance
///
/// Used by the distributor, which commits sibling outputs outside the
/// gated path.
pub fn stamp_provenance(
    params: &mut HashMap<String, qcal_core::OutputParameter>,
    execution_id: &str,
    task_id: &str,
) {
    for param in params.values_mut() {
        param.execution_id = Some(execution_id.to_string());
        param.task_id = Some(task_id.to_string());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::repository::FileCalibDataSaver;
    use qcal_core::{Figure, OutputParameter, RawData};
    use qcal_store::InMemoryNoteStore;
    use serde_json::json;

    fn pipeline(
        dir: &std::path::Path,
    ) -> (ResultPipeline, Arc<SimulatedBackend>, Arc<InMemoryNoteStore>) {
        let backend = Arc::new(SimulatedBackend::new());
        let saver = Arc::new(FileCalibDataSaver::new(dir));
        let notes = Arc::new(InMemoryNoteStore::new());
        let writer = NoteWriter::new(
            notes.clone(),
            RetryPolicy::default(),
            "qcal",
            "square_64",
        );
        (
            ResultPipeline::new(saver, backend.clone(), writer, 0.7),
            backend,
            notes,
        )
    }

    fn post_with_param(name: &str, value: f64) -> PostProcessResult {
        PostProcessResult::new().with_parameter(name, OutputParameter::new(value, "a.u."))
    }

    #[test]
    fn test_commit_stamps_provenance_and_mirrors() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _, _) = pipeline(dir.path());
        let mut manager = TaskManager::new();
        let mut calib = CalibData::new();
        let def = TaskDefinition::qubit("check_rabi");

        manager.ensure_task_exists("check_rabi", TaskType::Qubit, "5", "");
        let post = post_with_param("rabi_frequency", 2.1e7);
        let run = RunResult::new(json!(null));

        let committed = pipeline
            .process(
                &mut manager,
                &mut calib,
                "exec-1",
                &def,
                &post,
                &"5".to_string(),
                &run,
            )
            .unwrap();
        assert!(committed);

        let task = manager.get_task("check_rabi", TaskType::Qubit, "5").unwrap();
        let param = &task.output_parameters["rabi_frequency"];
        assert_eq!(param.execution_id.as_deref(), Some("exec-1"));
        assert_eq!(param.task_id.as_deref(), Some(task.task_id.as_str()));
        assert_eq!(calib.qubit_param("5", "rabi_frequency"), Some(2.1e7));
    }

    #[test]
    fn test_fidelity_gate_blocks_commit() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, backend, _) = pipeline(dir.path());
        let mut manager = TaskManager::new();
        let mut calib = CalibData::new();
        let def = TaskDefinition::qubit("x90_interleaved_rb").benchmark();

        manager.ensure_task_exists("x90_interleaved_rb", TaskType::Qubit, "5", "");
        let post = post_with_param("x90_gate_fidelity", 1.2);
        let run = RunResult::new(json!(null));

        let err = pipeline
            .process(
                &mut manager,
                &mut calib,
                "exec-1",
                &def,
                &post,
                &"5".to_string(),
                &run,
            )
            .unwrap_err();
        assert!(matches!(err, QcalError::FidelityOutOfRange { .. }));

        // No state mutation happened, yet the note save still ran
        let task = manager
            .get_task("x90_interleaved_rb", TaskType::Qubit, "5")
            .unwrap();
        assert!(task.output_parameters.is_empty());
        assert!(calib.is_empty());
        assert_eq!(backend.saved_notes(), vec!["exec-1"]);
    }

    #[test]
    fn test_r2_rollback_is_selective() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, backend, _) = pipeline(dir.path());
        let mut manager = TaskManager::new();
        let mut calib = CalibData::new();
        let def = TaskDefinition::qubit("check_ramsey");

        manager.ensure_task_exists("check_ramsey", TaskType::Qubit, "5", "");
        let post = post_with_param("t2_star", 15.3)
            .with_figure(Figure {
                name: "fit".into(),
                image_png: vec![1, 2, 3],
                spec_json: json!({}),
            })
            .with_raw_data(RawData {
                name: "iq".into(),
                samples: vec![],
            });
        let run = RunResult::new(json!(null))
            .with_r2(HashMap::from([("5".to_string(), 0.4)]));

        let err = pipeline
            .process(
                &mut manager,
                &mut calib,
                "exec-1",
                &def,
                &post,
                &"5".to_string(),
                &run,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            QcalError::GoodnessOfFitBelowThreshold { .. }
        ));

        // Outputs rolled back, artifacts kept, note saved
        let task = manager.get_task("check_ramsey", TaskType::Qubit, "5").unwrap();
        assert!(task.output_parameters.is_empty());
        assert!(!task.figure_paths.is_empty());
        assert!(!task.raw_data_paths.is_empty());
        assert!(calib.is_empty());
        assert_eq!(backend.saved_notes(), vec!["exec-1"]);
    }

    #[test]
    fn test_task_specific_threshold_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _, _) = pipeline(dir.path());
        let mut manager = TaskManager::new();
        let mut calib = CalibData::new();
        // Default 0.7 would reject R² 0.6; the task accepts down to 0.5
        let def = TaskDefinition::qubit("readout_classification").with_r2_threshold(0.5);

        manager.ensure_task_exists("readout_classification", TaskType::Qubit, "5", "");
        let post = post_with_param("readout_fidelity_proxy", 0.97);
        let run = RunResult::new(json!(null))
            .with_r2(HashMap::from([("5".to_string(), 0.6)]));

        let committed = pipeline
            .process(
                &mut manager,
                &mut calib,
                "exec-1",
                &def,
                &post,
                &"5".to_string(),
                &run,
            )
            .unwrap();
        assert!(committed);
    }

    #[test]
    fn test_missing_r2_skips_gate() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _, _) = pipeline(dir.path());
        let mut manager = TaskManager::new();
        let mut calib = CalibData::new();
        let def = TaskDefinition::qubit("check_rabi");

        manager.ensure_task_exists("check_rabi", TaskType::Qubit, "5", "");
        // R² map present but does not carry this qid
        let run = RunResult::new(json!(null))
            .with_r2(HashMap::from([("6".to_string(), 0.1)]));

        let committed = pipeline
            .process(
                &mut manager,
                &mut calib,
                "exec-1",
                &def,
                &post_with_param("rabi_frequency", 2.1e7),
                &"5".to_string(),
                &run,
            )
            .unwrap();
        assert!(committed);
    }

    #[test]
    fn test_empty_result_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _, _) = pipeline(dir.path());
        let mut manager = TaskManager::new();
        let mut calib = CalibData::new();
        let def = TaskDefinition::qubit("check_status");

        manager.ensure_task_exists("check_status", TaskType::Qubit, "5", "");
        let committed = pipeline
            .process(
                &mut manager,
                &mut calib,
                "exec-1",
                &def,
                &PostProcessResult::new(),
                &"5".to_string(),
                &RunResult::new(json!(null)),
            )
            .unwrap();
        assert!(!committed);
    }

    #[test]
    fn test_commit_upserts_calibration_note() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, backend, notes) = pipeline(dir.path());
        let mut manager = TaskManager::new();
        let mut calib = CalibData::new();
        let def = TaskDefinition::qubit("check_rabi");

        backend.put_note_field("lo_frequency", json!(9.5));
        manager.ensure_task_exists("check_rabi", TaskType::Qubit, "5", "");

        pipeline
            .process(
                &mut manager,
                &mut calib,
                "exec-1",
                &def,
                &post_with_param("rabi_frequency", 2.1e7),
                &"5".to_string(),
                &RunResult::new(json!(null)),
            )
            .unwrap();

        let key = NoteKey::new("qcal", "square_64", "exec-1", "check_rabi");
        let note = notes.find(&key).unwrap().unwrap();
        assert_eq!(note.fields["lo_frequency"], json!(9.5));
    }

    #[test]
    fn test_note_upsert_runs_after_validation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, backend, notes) = pipeline(dir.path());
        let mut manager = TaskManager::new();
        let mut calib = CalibData::new();
        let def = TaskDefinition::qubit("x90_interleaved_rb").benchmark();

        backend.put_note_field("attenuation", json!(20));
        manager.ensure_task_exists("x90_interleaved_rb", TaskType::Qubit, "5", "");

        let err = pipeline
            .process(
                &mut manager,
                &mut calib,
                "exec-1",
                &def,
                &post_with_param("x90_gate_fidelity", 1.2),
                &"5".to_string(),
                &RunResult::new(json!(null)),
            )
            .unwrap_err();
        assert!(matches!(err, QcalError::FidelityOutOfRange { .. }));

        // The gate rejected the result, yet the instrument snapshot landed
        let key = NoteKey::new("qcal", "square_64", "exec-1", "x90_interleaved_rb");
        let note = notes.find(&key).unwrap().unwrap();
        assert_eq!(note.fields["attenuation"], json!(20));
    }

    #[test]
    fn test_empty_snapshot_writes_no_note() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _, notes) = pipeline(dir.path());
        let mut manager = TaskManager::new();
        let mut calib = CalibData::new();
        let def = TaskDefinition::qubit("check_rabi");

        manager.ensure_task_exists("check_rabi", TaskType::Qubit, "5", "");
        pipeline
            .process(
                &mut manager,
                &mut calib,
                "exec-1",
                &def,
                &post_with_param("rabi_frequency", 2.1e7),
                &"5".to_string(),
                &RunResult::new(json!(null)),
            )
            .unwrap();

        let key = NoteKey::new("qcal", "square_64", "exec-1", "check_rabi");
        assert!(notes.find(&key).unwrap().is_none());
    }
}
