//! Repository interfaces
//!
//! Narrow persistence seams consumed by the pipeline and flow executor.
//! The artifact saver has a real file implementation; the rest ship with
//! in-memory fakes standing in for a document database.

use chrono::Utc;
use log::debug;
use qcal_core::{CalibData, Figure, QcalError, QcalResult, RawData};
use qcal_store::Execution;
use qcal_tasks::TaskResult;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Append-only history of task results
pub trait TaskResultHistoryRepository: Send + Sync {
    /// Record a task result snapshot under an execution
    fn save(&self, task: &TaskResult, execution_id: &str) -> QcalResult<()>;
}

/// Current chip calibration data
pub trait ChipRepository: Send + Sync {
    /// Merge freshly committed calibration data into the chip record
    fn update_chip_data(&self, chip_id: &str, calib_data: &CalibData, user: &str) -> QcalResult<()>;
}

/// Chip snapshot history
pub trait ChipHistoryRepository: Send + Sync {
    /// Snapshot the chip record under the given user
    fn create_history(&self, user: &str, chip_id: &str) -> QcalResult<()>;
}

/// Figure and raw-data artifact persistence
pub trait CalibDataSaver: Send + Sync {
    /// Persist figures; returns the written paths in figure order
    fn save_figures(&self, task_name: &str, qid: &str, figures: &[Figure])
        -> QcalResult<Vec<String>>;

    /// Persist raw arrays; returns the written paths in array order
    fn save_raw_data(&self, task_name: &str, qid: &str, raw: &[RawData])
        -> QcalResult<Vec<String>>;

    /// Persist the task result document itself
    fn save_task_json(&self, task: &TaskResult) -> QcalResult<()>;
}

/// Execution document lookup alongside the file store
pub trait ExecutionRepository: Send + Sync {
    /// Record an execution snapshot
    fn save(&self, execution: &Execution) -> QcalResult<()>;

    /// Look up an execution by id
    fn find_by_id(&self, execution_id: &str) -> QcalResult<Option<Execution>>;

    /// Reload, mutate, and save one execution document
    ///
    /// Implementations must apply `mutate` against the freshest stored
    /// snapshot so concurrent writers never lose updates. Returns the
    /// document as saved.
    fn update_with_optimistic_lock(
        &self,
        execution_id: &str,
        mutate: &mut dyn FnMut(&mut Execution),
    ) -> QcalResult<Execution>;
}

// ============================================================================
// File Artifact Saver
// ============================================================================

/// Saver writing artifacts under the calibration directory
///
/// Layout: `fig/<task>_<qid>_<i>.png` with a sibling `.json` figure
/// spec, `raw_data/<task>_<qid>_raw_<i>.csv` with complex samples as
/// two columns, and `task/<task_id>.json` for the result document.
pub struct FileCalibDataSaver {
    calib_dir: PathBuf,
}

impl FileCalibDataSaver {
    /// Create a saver rooted at the calibration directory
    pub fn new(calib_dir: impl Into<PathBuf>) -> Self {
        Self {
            calib_dir: calib_dir.into(),
        }
    }
}

impl CalibDataSaver for FileCalibDataSaver {
    fn save_figures(
        &self,
        task_name: &str,
        qid: &str,
        figures: &[Figure],
    ) -> QcalResult<Vec<String>> {
        let fig_dir = self.calib_dir.join("fig");
        fs::create_dir_all(&fig_dir)?;

        let mut paths = Vec::with_capacity(figures.len());
        for (i, figure) in figures.iter().enumerate() {
            let stem = format!("{}_{}_{}", task_name, qid, i);

            let png_path = fig_dir.join(format!("{}.png", stem));
            fs::write(&png_path, &figure.image_png)?;

            let json_path = fig_dir.join(format!("{}.json", stem));
            fs::write(&json_path, serde_json::to_vec_pretty(&figure.spec_json)?)?;

            debug!("wrote figure {}", png_path.display());
            paths.push(png_path.display().to_string());
        }
        Ok(paths)
    }

    fn save_raw_data(
        &self,
        task_name: &str,
        qid: &str,
        raw: &[RawData],
    ) -> QcalResult<Vec<String>> {
        let raw_dir = self.calib_dir.join("raw_data");
        fs::create_dir_all(&raw_dir)?;

        let mut paths = Vec::with_capacity(raw.len());
        for (i, array) in raw.iter().enumerate() {
            let path = raw_dir.join(format!("{}_{}_raw_{}.csv", task_name, qid, i));

            let mut file = fs::File::create(&path)?;
            writeln!(file, "re,im")?;
            for sample in &array.samples {
                writeln!(file, "{},{}", sample.re, sample.im)?;
            }
            file.sync_all()?;

            debug!("wrote raw data {}", path.display());
            paths.push(path.display().to_string());
        }
        Ok(paths)
    }

    fn save_task_json(&self, task: &TaskResult) -> QcalResult<()> {
        let task_dir = self.calib_dir.join("task");
        fs::create_dir_all(&task_dir)?;
        let path = task_dir.join(format!("{}.json", task.task_id));
        fs::write(&path, serde_json::to_vec_pretty(task)?)?;
        Ok(())
    }
}

// ============================================================================
// In-Memory Fakes
// ============================================================================

/// In-memory repository implementations for tests and single-process runs
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every saved (execution_id, task) snapshot
    #[derive(Default)]
    pub struct InMemoryTaskResultHistory {
        saved: Mutex<Vec<(String, TaskResult)>>,
    }

    impl InMemoryTaskResultHistory {
        /// Create an empty history
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of recorded snapshots
        pub fn len(&self) -> usize {
            self.saved.lock().unwrap_or_else(|e| e.into_inner()).len()
        }

        /// Check whether the history is empty
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl TaskResultHistoryRepository for InMemoryTaskResultHistory {
        fn save(&self, task: &TaskResult, execution_id: &str) -> QcalResult<()> {
            self.saved
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((execution_id.to_string(), task.clone()));
            Ok(())
        }
    }

    /// Accumulates chip data updates by chip id
    #[derive(Default)]
    pub struct InMemoryChipRepository {
        chips: Mutex<HashMap<String, CalibData>>,
        history: Mutex<Vec<(String, String)>>,
    }

    impl InMemoryChipRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Accumulated calibration data for a chip
        pub fn chip_data(&self, chip_id: &str) -> Option<CalibData> {
            self.chips
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(chip_id)
                .cloned()
        }

        /// Recorded (user, chip_id) history entries
        pub fn history(&self) -> Vec<(String, String)> {
            self.history
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }
    }

    impl ChipRepository for InMemoryChipRepository {
        fn update_chip_data(
            &self,
            chip_id: &str,
            calib_data: &CalibData,
            _user: &str,
        ) -> QcalResult<()> {
            self.chips
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(chip_id.to_string())
                .or_default()
                .merge(calib_data);
            Ok(())
        }
    }

    impl ChipHistoryRepository for InMemoryChipRepository {
        fn create_history(&self, user: &str, chip_id: &str) -> QcalResult<()> {
            self.history
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((user.to_string(), chip_id.to_string()));
            Ok(())
        }
    }

    /// Execution snapshots keyed by id
    #[derive(Default)]
    pub struct InMemoryExecutionRepository {
        executions: Mutex<HashMap<String, Execution>>,
    }

    impl InMemoryExecutionRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl ExecutionRepository for InMemoryExecutionRepository {
        fn save(&self, execution: &Execution) -> QcalResult<()> {
            self.executions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(execution.execution_id.clone(), execution.clone());
            Ok(())
        }

        fn find_by_id(&self, execution_id: &str) -> QcalResult<Option<Execution>> {
            Ok(self
                .executions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(execution_id)
                .cloned())
        }

        fn update_with_optimistic_lock(
            &self,
            execution_id: &str,
            mutate: &mut dyn FnMut(&mut Execution),
        ) -> QcalResult<Execution> {
            let mut executions = self.executions.lock().unwrap_or_else(|e| e.into_inner());
            let execution = executions.get_mut(execution_id).ok_or_else(|| {
                QcalError::Persistence(format!("execution '{}' not found", execution_id))
            })?;
            mutate(execution);
            execution.updated_at = Utc::now();
            Ok(execution.clone())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::memory::*;
    use super::*;
    use num_complex::Complex64;
    use qcal_tasks::TaskType;
    use serde_json::json;

    #[test]
    fn test_file_saver_figure_layout() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCalibDataSaver::new(dir.path());

        let figures = vec![Figure {
            name: "fit".into(),
            image_png: vec![0x89, 0x50, 0x4e, 0x47],
            spec_json: json!({"trace": "lorentzian"}),
        }];
        let paths = saver.save_figures("check_rabi", "5", &figures).unwrap();

        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("fig/check_rabi_5_0.png"));
        assert!(dir.path().join("fig/check_rabi_5_0.json").exists());
    }

    #[test]
    fn test_file_saver_raw_csv_columns() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCalibDataSaver::new(dir.path());

        let raw = vec![RawData {
            name: "iq".into(),
            samples: vec![Complex64::new(0.5, -0.25), Complex64::new(1.0, 0.0)],
        }];
        let paths = saver.save_raw_data("check_rabi", "5", &raw).unwrap();

        assert!(paths[0].ends_with("raw_data/check_rabi_5_raw_0.csv"));
        let body = fs::read_to_string(&paths[0]).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "re,im");
        assert_eq!(lines[1], "0.5,-0.25");
        assert_eq!(lines[2], "1,0");
    }

    #[test]
    fn test_file_saver_task_json() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileCalibDataSaver::new(dir.path());

        let task = TaskResult::new("check_rabi", TaskType::Qubit, "5");
        saver.save_task_json(&task).unwrap();
        assert!(dir
            .path()
            .join(format!("task/{}.json", task.task_id))
            .exists());
    }

    #[test]
    fn test_in_memory_chip_repository_merges() {
        let repo = InMemoryChipRepository::new();

        let mut first = CalibData::new();
        first.put_qubit_param("0", "qubit_frequency", 7.9);
        repo.update_chip_data("square_64", &first, "alice").unwrap();

        let mut second = CalibData::new();
        second.put_qubit_param("1", "qubit_frequency", 8.1);
        repo.update_chip_data("square_64", &second, "alice").unwrap();

        let chip = repo.chip_data("square_64").unwrap();
        assert_eq!(chip.qubit_param("0", "qubit_frequency"), Some(7.9));
        assert_eq!(chip.qubit_param("1", "qubit_frequency"), Some(8.1));

        repo.create_history("alice", "square_64").unwrap();
        assert_eq!(repo.history().len(), 1);
    }

    #[test]
    fn test_in_memory_execution_repository() {
        let repo = InMemoryExecutionRepository::new();
        let exec = Execution::new("exec-1");
        repo.save(&exec).unwrap();

        assert!(repo.find_by_id("exec-1").unwrap().is_some());
        assert!(repo.find_by_id("exec-2").unwrap().is_none());
    }

    #[test]
    fn test_update_with_optimistic_lock_applies_on_fresh_snapshot() {
        let repo = InMemoryExecutionRepository::new();
        repo.save(&Execution::new("exec-1")).unwrap();

        repo.update_with_optimistic_lock("exec-1", &mut |e| {
            e.tags.push("nightly".to_string());
        })
        .unwrap();
        let updated = repo
            .update_with_optimistic_lock("exec-1", &mut |e| {
                e.tags.push("retune".to_string());
            })
            .unwrap();

        // The second mutation saw the first one's write
        assert_eq!(updated.tags, vec!["nightly", "retune"]);
        let stored = repo.find_by_id("exec-1").unwrap().unwrap();
        assert_eq!(stored.tags, vec!["nightly", "retune"]);

        let err = repo
            .update_with_optimistic_lock("exec-2", &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, QcalError::Persistence(_)));
    }
}
