//! Engine configuration

use qcal_core::{QcalError, QcalResult};
use qcal_store::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default R² acceptance threshold
pub const DEFAULT_R2_THRESHOLD: f64 = 0.7;

/// Default bounded wait for the execution file lock
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

/// Configuration for one calibration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Calibration output directory (execution file, figures, raw data)
    pub calib_dir: PathBuf,
    /// R² threshold applied when a task carries none of its own
    pub default_r2_threshold: f64,
    /// Bounded wait for the execution file lock, in milliseconds
    pub lock_timeout_ms: u64,
    /// Backoff policy for calibration-note upserts
    pub note_retry: RetryPolicy,
    /// Upper bound on concurrently running operations per group
    pub max_parallel_ops: usize,
    /// User recorded on chip history entries
    pub username: String,
    /// Project keying the calibration notes
    pub project: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            calib_dir: PathBuf::from("./calib"),
            default_r2_threshold: DEFAULT_R2_THRESHOLD,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            note_retry: RetryPolicy::default(),
            max_parallel_ops: 4,
            username: "qcal".to_string(),
            project: "qcal".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create with defaults rooted at `calib_dir`
    pub fn new(calib_dir: impl Into<PathBuf>) -> Self {
        Self {
            calib_dir: calib_dir.into(),
            ..Self::default()
        }
    }

    /// Set the default R² threshold
    pub fn with_r2_threshold(mut self, threshold: f64) -> Self {
        self.default_r2_threshold = threshold;
        self
    }

    /// Set the lock timeout
    pub fn with_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    /// Set the note retry policy
    pub fn with_note_retry(mut self, policy: RetryPolicy) -> Self {
        self.note_retry = policy;
        self
    }

    /// Set the parallelism bound
    pub fn with_max_parallel_ops(mut self, max_parallel_ops: usize) -> Self {
        self.max_parallel_ops = max_parallel_ops;
        self
    }

    /// Set the user name
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the project keying the calibration notes
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Lock timeout as a duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Validate parameter ranges
    pub fn validate(&self) -> QcalResult<()> {
        if !(0.0..=1.0).contains(&self.default_r2_threshold) {
            return Err(QcalError::InvalidParameterValue(format!(
                "default_r2_threshold must be in [0, 1], got {}",
                self.default_r2_threshold
            )));
        }
        if self.lock_timeout_ms == 0 {
            return Err(QcalError::InvalidParameterValue(
                "lock_timeout_ms must be positive".to_string(),
            ));
        }
        if self.note_retry.max_attempts == 0 {
            return Err(QcalError::InvalidParameterValue(
                "note_retry.max_attempts must be positive".to_string(),
            ));
        }
        if self.max_parallel_ops == 0 {
            return Err(QcalError::InvalidParameterValue(
                "max_parallel_ops must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_r2_threshold, DEFAULT_R2_THRESHOLD);
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new("/tmp/calib")
            .with_r2_threshold(0.9)
            .with_lock_timeout_ms(5_000)
            .with_max_parallel_ops(2)
            .with_username("alice")
            .with_project("tuning");

        assert_eq!(config.calib_dir, PathBuf::from("/tmp/calib"));
        assert_eq!(config.default_r2_threshold, 0.9);
        assert_eq!(config.lock_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.max_parallel_ops, 2);
        assert_eq!(config.username, "alice");
        assert_eq!(config.project, "tuning");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        assert!(EngineConfig::default()
            .with_r2_threshold(1.5)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_lock_timeout_ms(0)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_max_parallel_ops(0)
            .validate()
            .is_err());
    }
}
