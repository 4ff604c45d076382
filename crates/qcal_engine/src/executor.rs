//! Calibration flow executor
//!
//! Ties the parts together for one run: resolve the target, build a
//! schedule per task, dispatch each batch of parallel groups to scoped
//! threads (qids inside a group run strictly sequentially), push every
//! result through the pipeline, fan MUX-level results out, and persist
//! the execution document after every batch.
//!
//! Validation and distribution errors stay local to their task entry;
//! scheduling, lock, and persistence errors fail the whole execution.

use crate::backend::HardwareBackend;
use crate::config::EngineConfig;
use crate::distributor::MuxResultDistributor;
use crate::pipeline::{NoteWriter, ResultPipeline};
use crate::repository::{
    memory::{InMemoryChipRepository, InMemoryExecutionRepository, InMemoryTaskResultHistory},
    CalibDataSaver, ChipHistoryRepository, ChipRepository, ExecutionRepository,
    FileCalibDataSaver, TaskResultHistoryRepository,
};
use log::{error, info, warn};
use qcal_core::{
    split_coupling_id, CalibData, ChipTopology, CouplingId, ParameterValue, Qid, QcalError,
    QcalResult, Target,
};
use qcal_schedule::{CrScheduler, MuxScheduler};
use qcal_store::{Execution, ExecutionStore, InMemoryNoteStore, NoteStore};
use qcal_tasks::{CalibrationTask, TaskManager, TaskRegistry, TaskType};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// One batch of parallel groups; groups run concurrently, qids within a
/// group run sequentially
type GroupBatch = Vec<Vec<Qid>>;

/// Orchestrates one calibration run end to end
pub struct CalibrationFlow {
    chip: ChipTopology,
    registry: Arc<TaskRegistry>,
    config: EngineConfig,
    backend: Arc<dyn HardwareBackend>,
    saver: Arc<dyn CalibDataSaver>,
    store: ExecutionStore,
    history: Arc<dyn TaskResultHistoryRepository>,
    chip_repo: Arc<dyn ChipRepository>,
    chip_history: Arc<dyn ChipHistoryRepository>,
    execution_repo: Arc<dyn ExecutionRepository>,
    notes: Arc<dyn NoteStore>,
    task_parameters: HashMap<String, HashMap<String, ParameterValue>>,
}

impl CalibrationFlow {
    /// Create a flow with file-backed artifacts and in-memory repositories
    pub fn new(
        chip: ChipTopology,
        registry: Arc<TaskRegistry>,
        config: EngineConfig,
        backend: Arc<dyn HardwareBackend>,
    ) -> QcalResult<Self> {
        config.validate()?;
        let chip_repo = Arc::new(InMemoryChipRepository::new());
        Ok(Self {
            saver: Arc::new(FileCalibDataSaver::new(&config.calib_dir)),
            store: ExecutionStore::new(&config.calib_dir, config.lock_timeout()),
            history: Arc::new(InMemoryTaskResultHistory::new()),
            chip_repo: chip_repo.clone(),
            chip_history: chip_repo,
            execution_repo: Arc::new(InMemoryExecutionRepository::new()),
            notes: Arc::new(InMemoryNoteStore::new()),
            chip,
            registry,
            config,
            backend,
            task_parameters: HashMap::new(),
        })
    }

    /// Replace the artifact saver
    pub fn with_saver(mut self, saver: Arc<dyn CalibDataSaver>) -> Self {
        self.saver = saver;
        self
    }

    /// Replace the task result history repository
    pub fn with_history(mut self, history: Arc<dyn TaskResultHistoryRepository>) -> Self {
        self.history = history;
        self
    }

    /// Replace the chip repositories
    pub fn with_chip_repositories(
        mut self,
        chip_repo: Arc<dyn ChipRepository>,
        chip_history: Arc<dyn ChipHistoryRepository>,
    ) -> Self {
        self.chip_repo = chip_repo;
        self.chip_history = chip_history;
        self
    }

    /// Replace the execution snapshot repository
    pub fn with_execution_repository(mut self, repo: Arc<dyn ExecutionRepository>) -> Self {
        self.execution_repo = repo;
        self
    }

    /// Replace the calibration-note store
    pub fn with_note_store(mut self, notes: Arc<dyn NoteStore>) -> Self {
        self.notes = notes;
        self
    }

    /// Attach resolved input parameters for one task
    pub fn with_task_parameters(
        mut self,
        task_name: &str,
        params: HashMap<String, ParameterValue>,
    ) -> Self {
        self.task_parameters.insert(task_name.to_string(), params);
        self
    }

    // ========================================================================
    // Flow Entry Point
    // ========================================================================

    /// Run the named tasks against a target and return the final state
    pub fn run(&self, target: &Target, task_names: &[&str]) -> QcalResult<Execution> {
        self.backend.connect()?;

        let execution = Execution::generate();
        self.store.create(&execution)?;
        let execution = self.store.update(|e| e.start())?;
        self.execution_repo.save(&execution)?;
        let execution_id = execution.execution_id.clone();
        info!("execution {} started", execution_id);

        match self.run_tasks(&execution_id, target, task_names) {
            Ok(()) => {
                let done = self.store.update(|e| e.complete("all tasks processed"))?;
                self.execution_repo.save(&done)?;
                self.finalize_chip(&done)?;
                info!("execution {} completed", execution_id);
                Ok(done)
            }
            Err(err) => {
                error!("execution {} failed: {}", execution_id, err);
                // Best effort: the original error is what the caller needs
                if let Err(save_err) = self.store.update(|e| e.fail(err.to_string())) {
                    warn!("could not persist failed execution state: {}", save_err);
                }
                if let Err(save_err) = self
                    .execution_repo
                    .update_with_optimistic_lock(&execution_id, &mut |e| e.fail(err.to_string()))
                {
                    warn!("could not mirror failed execution state: {}", save_err);
                }
                Err(err)
            }
        }
    }

    fn run_tasks(
        &self,
        execution_id: &str,
        target: &Target,
        task_names: &[&str],
    ) -> QcalResult<()> {
        let resolved = target.resolve(&self.chip)?;

        for name in task_names {
            let task = self.registry.get(name)?;
            let batches = self.schedule(&task, &resolved.qids, &resolved.couplings)?;

            for batch in batches {
                self.dispatch_batch(execution_id, &task, batch, &resolved.qids)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Build the batch sequence for one task
    fn schedule(
        &self,
        task: &Arc<dyn CalibrationTask>,
        qids: &[Qid],
        couplings: &[CouplingId],
    ) -> QcalResult<Vec<GroupBatch>> {
        let def = task.definition();
        match def.task_type {
            TaskType::Qubit => self.schedule_qubit(def.mux_level, qids),
            TaskType::Coupling => self.schedule_coupling(qids, couplings),
            // One unit, no per-entity scheduling
            TaskType::Global | TaskType::System => {
                Ok(vec![vec![vec![String::new()]]])
            }
        }
    }

    fn schedule_qubit(&self, mux_level: bool, qids: &[Qid]) -> QcalResult<Vec<GroupBatch>> {
        let wanted: HashSet<&Qid> = qids.iter().collect();
        let mux_ids: BTreeSet<_> = qids.iter().filter_map(|q| self.chip.mux_of(q)).collect();
        let mux_ids: Vec<_> = mux_ids.into_iter().collect();

        // Qubits outside the target that share a scheduled MUX stay out
        let mut exclude = Vec::new();
        for mux_id in &mux_ids {
            for qid in self.chip.mux_qubits(*mux_id)? {
                if !wanted.contains(qid) {
                    exclude.push(qid.clone());
                }
            }
        }

        let scheduler = MuxScheduler::new(&self.chip);
        let result = scheduler.generate_from_mux(&mux_ids, &exclude)?;

        let batches = result
            .stages
            .into_iter()
            .map(|stage| {
                if mux_level {
                    // One run per MUX, attached to position 0; when position 0 is
                    // excluded the first remaining position stands in. Siblings
                    // are serviced by distribution.
                    stage
                        .parallel_groups
                        .into_iter()
                        .map(|group| vec![group[0].clone()])
                        .collect()
                } else {
                    stage.parallel_groups
                }
            })
            .collect();
        Ok(batches)
    }

    fn schedule_coupling(
        &self,
        qids: &[Qid],
        couplings: &[CouplingId],
    ) -> QcalResult<Vec<GroupBatch>> {
        // Candidates are every qubit touched by the resolved couplings,
        // falling back to the resolved qids for MUX-style targets
        let candidates: Vec<Qid> = if couplings.is_empty() {
            qids.to_vec()
        } else {
            let mut seen = BTreeSet::new();
            for cid in couplings {
                let (a, b) = split_coupling_id(cid)?;
                seen.insert(a);
                seen.insert(b);
            }
            seen.into_iter().collect()
        };

        let calib_data = self.store.load()?.calib_data;
        let scheduler = CrScheduler::default_for_chip();
        let groups = scheduler.generate(
            &self.chip,
            &calib_data,
            &candidates,
            self.config.max_parallel_ops,
        )?;

        // Each pair is one parallel unit within its group
        Ok(groups
            .into_iter()
            .map(|group| group.into_iter().map(|pair| vec![pair.id()]).collect())
            .collect())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Run one batch of parallel groups and persist the merged state
    fn dispatch_batch(
        &self,
        execution_id: &str,
        task: &Arc<dyn CalibrationTask>,
        batch: GroupBatch,
        target_qids: &[Qid],
    ) -> QcalResult<()> {
        let mut results: Vec<QcalResult<(TaskManager, CalibData)>> = Vec::new();

        std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .into_iter()
                .map(|group| {
                    scope.spawn(move || self.run_group(execution_id, task, group, target_qids))
                })
                .collect();
            for handle in handles {
                results.push(handle.join().unwrap_or_else(|_| {
                    Err(QcalError::InternalError("worker thread panicked".to_string()))
                }));
            }
        });

        let mut managers = Vec::new();
        for result in results {
            managers.push(result?);
        }

        // One persisted update per batch keeps the on-disk state current
        let merged = self.store.update(|exec| {
            for (manager, delta) in &managers {
                exec.task_results
                    .insert(manager.id.clone(), manager.container.clone());
                exec.calib_data.merge(delta);
            }
        })?;
        self.execution_repo.save(&merged)?;
        Ok(())
    }

    /// Run one group's qids strictly sequentially in a fresh manager
    fn run_group(
        &self,
        execution_id: &str,
        task: &Arc<dyn CalibrationTask>,
        group: Vec<Qid>,
        target_qids: &[Qid],
    ) -> QcalResult<(TaskManager, CalibData)> {
        let mut manager = TaskManager::new();
        let mut calib_data = CalibData::new();

        for qid in &group {
            self.run_one(&mut manager, &mut calib_data, execution_id, task, qid, target_qids)?;
        }
        Ok((manager, calib_data))
    }

    /// Run one task for one qid: backend, postprocess, pipeline, fan-out
    fn run_one(
        &self,
        manager: &mut TaskManager,
        calib_data: &mut CalibData,
        execution_id: &str,
        task: &Arc<dyn CalibrationTask>,
        qid: &Qid,
        target_qids: &[Qid],
    ) -> QcalResult<()> {
        let def = task.definition();
        let name = def.name;
        let task_type = def.task_type;
        let no_params = HashMap::new();
        let inputs = self.task_parameters.get(name).unwrap_or(&no_params);

        manager.ensure_task_exists(name, task_type, qid, execution_id);
        manager.start_task(name, task_type, qid)?;

        let run_result = match self.backend.run(name, inputs, qid) {
            Ok(result) => result,
            Err(err) => {
                // Instrument failures stay local to this task entry
                warn!("backend run failed for '{}' ({}): {}", name, qid, err);
                manager.update_task_status_to_failed(name, task_type, qid, &err.to_string())?;
                manager.end_task(name, task_type, qid)?;
                return Ok(());
            }
        };

        let outcome = task
            .postprocess(&run_result, qid)
            .and_then(|post| {
                let notes = NoteWriter::new(
                    self.notes.clone(),
                    self.config.note_retry.clone(),
                    self.config.project.clone(),
                    self.chip.chip_id(),
                );
                let pipeline = ResultPipeline::new(
                    self.saver.clone(),
                    self.backend.clone(),
                    notes,
                    self.config.default_r2_threshold,
                );
                pipeline.process(
                    manager,
                    calib_data,
                    execution_id,
                    def,
                    &post,
                    qid,
                    &run_result,
                )
            });

        match outcome {
            Ok(_) => {
                manager.update_task_status_to_completed(name, task_type, qid, "committed")?;
            }
            Err(err) if err.is_recoverable() => {
                warn!("task '{}' ({}) recovered locally: {}", name, qid, err);
                manager.update_task_status_to_failed(name, task_type, qid, &err.to_string())?;
            }
            Err(fatal) => return Err(fatal),
        }
        manager.end_task(name, task_type, qid)?;

        if let Some(result) = manager.get_task(name, task_type, qid) {
            self.history.save(result, execution_id)?;
            self.saver.save_task_json(result)?;
        }

        if def.mux_level {
            let distributor = MuxResultDistributor::new(&self.chip, self.saver.clone());
            distributor.distribute(
                manager,
                calib_data,
                execution_id,
                task,
                &run_result,
                qid,
                target_qids,
            )?;
        }
        Ok(())
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Push the accumulated calibration data into the chip record
    fn finalize_chip(&self, execution: &Execution) -> QcalResult<()> {
        if execution.calib_data.is_empty() {
            return Ok(());
        }
        self.chip_repo.update_chip_data(
            self.chip.chip_id(),
            &execution.calib_data,
            &self.config.username,
        )?;
        self.chip_history
            .create_history(&self.config.username, self.chip.chip_id())?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
