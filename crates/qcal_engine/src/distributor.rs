//! MUX result distributor
//!
//! A MUX-level measurement runs once, for the representative qubit.
//! This fans the shared run result out to the other three positions:
//! each sibling gets its own task entry, its own postprocess pass over
//! the same raw result, and its own committed outputs and artifacts.
//! Siblings fail independently; one bad fit never blocks the rest.

use crate::pipeline::stamp_provenance;
use crate::repository::CalibDataSaver;
use log::warn;
use qcal_core::{CalibData, ChipTopology, Qid, QcalError, QcalResult, RunResult};
use qcal_tasks::{CalibrationTask, TaskManager, TaskType};
use std::collections::HashSet;
use std::sync::Arc;

/// Per-sibling distribution outcome
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionOutcome {
    /// Sibling qid
    pub qid: Qid,
    /// Whether the sibling reached completed
    pub succeeded: bool,
    /// Completion or failure message
    pub message: String,
}

/// Fans MUX-level results out to sibling qubits
pub struct MuxResultDistributor<'a> {
    chip: &'a ChipTopology,
    saver: Arc<dyn CalibDataSaver>,
}

impl<'a> MuxResultDistributor<'a> {
    /// Create for a chip
    pub fn new(chip: &'a ChipTopology, saver: Arc<dyn CalibDataSaver>) -> Self {
        Self { chip, saver }
    }

    /// Distribute one run result to the representative's MUX siblings
    ///
    /// Only siblings inside `target_qids` receive an entry; qubits the
    /// target excluded are passed over entirely. No R² gate applies
    /// here: the fit quality was already judged for the representative.
    /// Returns one outcome per serviced sibling, in MUX position order.
    pub fn distribute(
        &self,
        manager: &mut TaskManager,
        calib_data: &mut CalibData,
        execution_id: &str,
        task: &Arc<dyn CalibrationTask>,
        run_result: &RunResult,
        representative_qid: &Qid,
        target_qids: &[Qid],
    ) -> QcalResult<Vec<DistributionOutcome>> {
        let mux_id = self
            .chip
            .mux_of(representative_qid)
            .ok_or_else(|| QcalError::UnknownQubit(representative_qid.clone()))?;

        let wanted: HashSet<&Qid> = target_qids.iter().collect();
        let siblings: Vec<Qid> = self
            .chip
            .mux_qubits(mux_id)?
            .iter()
            .filter(|q| *q != representative_qid && wanted.contains(q))
            .cloned()
            .collect();

        let mut outcomes = Vec::with_capacity(siblings.len());
        for qid in siblings {
            let outcome = match self.distribute_one(
                manager,
                calib_data,
                execution_id,
                task,
                run_result,
                &qid,
            ) {
                Ok(message) => DistributionOutcome {
                    qid,
                    succeeded: true,
                    message,
                },
                Err(err) => {
                    let wrapped = QcalError::SiblingDistribution {
                        qid: qid.clone(),
                        reason: err.to_string(),
                    };
                    warn!("{}", wrapped);
                    let message = wrapped.to_string();
                    // Failure is recorded on the sibling's task; iteration continues
                    let name = task.definition().name;
                    let task_type = task.definition().task_type;
                    if let Err(record_err) =
                        manager.update_task_status_to_failed(name, task_type, &qid, &message)
                    {
                        warn!(
                            "could not record failure for sibling {}: {}",
                            qid, record_err
                        );
                    }
                    if let Err(record_err) = manager.end_task(name, task_type, &qid) {
                        warn!("could not stamp end time for sibling {}: {}", qid, record_err);
                    }
                    DistributionOutcome {
                        qid,
                        succeeded: false,
                        message,
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn distribute_one(
        &self,
        manager: &mut TaskManager,
        calib_data: &mut CalibData,
        execution_id: &str,
        task: &Arc<dyn CalibrationTask>,
        run_result: &RunResult,
        qid: &Qid,
    ) -> QcalResult<String> {
        let name = task.definition().name;
        let task_type = task.definition().task_type;

        let task_id = manager.ensure_task_exists(name, task_type, qid, "");
        manager.start_task(name, task_type, qid)?;

        let post = task.postprocess(run_result, qid)?;

        if !post.output_parameters.is_empty() {
            let mut params = post.output_parameters.clone();
            stamp_provenance(&mut params, execution_id, &task_id);
            manager.put_output_parameters(name, task_type, qid, params)?;

            for (key, param) in &post.output_parameters {
                if task_type == TaskType::Qubit {
                    calib_data.put_qubit_param(qid, key, param.value);
                }
            }
        }

        if !post.figures.is_empty() {
            let paths = self.saver.save_figures(name, qid, &post.figures)?;
            manager.set_figure_paths(name, task_type, qid, paths)?;
        }
        if !post.raw_data.is_empty() {
            let paths = self.saver.save_raw_data(name, qid, &post.raw_data)?;
            manager.set_raw_data_paths(name, task_type, qid, paths)?;
        }

        let message = "distributed from mux representative".to_string();
        manager.update_task_status_to_completed(name, task_type, qid, &message)?;
        manager.end_task(name, task_type, qid)?;
        Ok(message)
    }
}

// ============================================================================
// Tests
// ============================================================================
