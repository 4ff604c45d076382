//! Concurrency-safe execution persistence
//!
//! One JSON document per calibration directory, shared by multiple OS
//! processes. Every update runs lock -> reload -> mutate -> temp-write ->
//! atomic rename, so updates serialize across processes and a partial
//! file is never observable.

use crate::execution::Execution;
use chrono::Utc;
use log::{debug, warn};
use qcal_core::{QcalError, QcalResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Execution state file name inside the calibration directory
pub const EXECUTION_FILE: &str = "execution_note.json";

const LOCK_POLL_START: Duration = Duration::from_millis(10);
const LOCK_POLL_MAX: Duration = Duration::from_millis(200);

// ============================================================================
// File Lock
// ============================================================================

/// Exclusive advisory lock backed by an `O_EXCL` lock file
///
/// The lock file carries the owner pid and acquisition time for
/// diagnosis; it is removed on drop. Acquisition polls with backoff and
/// fails with `LockTimeout` instead of hanging.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock at `path`, waiting at most `timeout`
    pub fn acquire(path: &Path, timeout: Duration) -> QcalResult<Self> {
        let started = Instant::now();
        let mut delay = LOCK_POLL_START;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let payload = format!(
                        "{{\"pid\":{},\"acquired_at\":\"{}\"}}\n",
                        std::process::id(),
                        Utc::now().to_rfc3339()
                    );
                    let _ = file.write_all(payload.as_bytes());
                    let _ = file.sync_all();
                    debug!("acquired lock {}", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        warn!("lock acquisition timed out on {}", path.display());
                        return Err(QcalError::LockTimeout {
                            path: path.display().to_string(),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(delay.min(timeout.saturating_sub(waited)));
                    delay = (delay * 2).min(LOCK_POLL_MAX);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// ============================================================================
// Execution Store
// ============================================================================

/// File-backed execution store
pub struct ExecutionStore {
    calib_dir: PathBuf,
    lock_timeout: Duration,
}

impl ExecutionStore {
    /// Create a store rooted at the calibration directory
    pub fn new(calib_dir: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            calib_dir: calib_dir.into(),
            lock_timeout,
        }
    }

    /// Path of the execution state file
    pub fn path(&self) -> PathBuf {
        self.calib_dir.join(EXECUTION_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.calib_dir.join(format!("{}.lock", EXECUTION_FILE))
    }

    /// Write the initial execution document
    pub fn create(&self, execution: &Execution) -> QcalResult<()> {
        fs::create_dir_all(&self.calib_dir)?;
        let _lock = FileLock::acquire(&self.lock_path(), self.lock_timeout)?;
        self.write_atomic(execution)
    }

    /// Load the latest on-disk state
    pub fn load(&self) -> QcalResult<Execution> {
        let bytes = fs::read(self.path())?;
        serde_json::from_slice(&bytes)
            .map_err(|e| QcalError::Persistence(format!("corrupt execution document: {}", e)))
    }

    /// Apply `mutator` under the lock and persist atomically
    ///
    /// The latest on-disk state is reloaded after lock acquisition, so a
    /// concurrent writer's prior update is always subsumed rather than
    /// lost. Returns the persisted document.
    pub fn update<F>(&self, mutator: F) -> QcalResult<Execution>
    where
        F: FnOnce(&mut Execution),
    {
        let _lock = FileLock::acquire(&self.lock_path(), self.lock_timeout)?;

        let mut execution = self.load()?;
        mutator(&mut execution);
        execution.updated_at = Utc::now();
        self.write_atomic(&execution)?;
        Ok(execution)
    }

    /// Serialize to a sibling temp file and rename into place
    fn write_atomic(&self, execution: &Execution) -> QcalResult<()> {
        let target = self.path();
        let tmp = self.calib_dir.join(format!(
            ".{}.tmp.{}",
            EXECUTION_FILE,
            std::process::id()
        ));

        let bytes = serde_json::to_vec_pretty(execution)
            .map_err(|e| QcalError::Persistence(e.to_string()))?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, &target)
            .map_err(|e| QcalError::Persistence(format!("atomic rename failed: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
